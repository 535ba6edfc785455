//! Unit conversions between UBA, AMG, lots and collateral tokens
//!
//! Three denominations flow through the ledger:
//!
//! - **UBA**: smallest unit of the backed asset on its native chain
//! - **AMG**: internal minting granularity (`granularity_uba` UBA per AMG),
//!   used for fee and reward math
//! - **lots**: minimum mintable/redeemable quantum, a whole number of AMG
//!
//! # Critical Invariants
//!
//! 1. All authoritative amounts are `u128`; division always rounds down
//! 2. Prices carry a fixed 5-decimal scale (`PRICE_SCALE`)
//! 3. No floating point anywhere in this module

use serde::{Deserialize, Serialize};

/// Basis point denominator: 10_000 BIPS = 100%.
pub const MAX_BIPS: u128 = 10_000;

/// Fixed-point scale for price quotes (5 decimals).
pub const PRICE_SCALE: u128 = 100_000;

/// Multiply an amount by a BIPS fraction, rounding down.
///
/// # Example
/// ```
/// use fasset_ledger_core_rs::core::units::mul_bips;
///
/// assert_eq!(mul_bips(10_000, 2_500), 2_500); // 25%
/// assert_eq!(mul_bips(3, 5_000), 1);          // rounds down
/// ```
pub fn mul_bips(amount: u128, bips: u128) -> u128 {
    amount * bips / MAX_BIPS
}

/// Convert UBA to AMG, rounding down to whole granularity units.
pub fn uba_to_amg(amount_uba: u128, granularity_uba: u128) -> u128 {
    amount_uba / granularity_uba
}

/// Convert AMG back to UBA (exact).
pub fn amg_to_uba(amount_amg: u128, granularity_uba: u128) -> u128 {
    amount_amg * granularity_uba
}

/// Convert a lot count to UBA (exact).
pub fn lots_to_uba(lots: u128, lot_size_uba: u128) -> u128 {
    lots * lot_size_uba
}

/// Price quote for one collateral type, delivered by the price oracle.
///
/// Both prices are fixed-point with [`PRICE_SCALE`] (5 decimals, matching the
/// oracle feed format): `amg_token_price` is collateral token wei per AMG,
/// `usd5_token_price` is collateral token wei per USD5 unit. Staleness policy
/// is the oracle's responsibility; the ledger treats quotes as current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Collateral token wei per AMG, scaled by `PRICE_SCALE`
    pub amg_token_price: u128,
    /// Collateral token wei per USD5 unit, scaled by `PRICE_SCALE`
    pub usd5_token_price: u128,
}

impl PriceQuote {
    pub fn new(amg_token_price: u128, usd5_token_price: u128) -> Self {
        Self {
            amg_token_price,
            usd5_token_price,
        }
    }

    /// Convert an AMG amount to collateral token wei, rounding down.
    ///
    /// # Example
    /// ```
    /// use fasset_ledger_core_rs::core::units::{PriceQuote, PRICE_SCALE};
    ///
    /// let price = PriceQuote::new(2 * PRICE_SCALE, PRICE_SCALE);
    /// assert_eq!(price.convert_amg_to_token(50), 100);
    /// ```
    pub fn convert_amg_to_token(&self, amount_amg: u128) -> u128 {
        amount_amg * self.amg_token_price / PRICE_SCALE
    }

    /// Convert a USD5-denominated amount to collateral token wei.
    pub fn convert_usd5_to_token(&self, amount_usd5: u128) -> u128 {
        amount_usd5 * self.usd5_token_price / PRICE_SCALE
    }
}

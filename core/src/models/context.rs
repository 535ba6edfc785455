//! Ledger settings and pricing context
//!
//! Settings mirror the asset manager parameters that govern accounting:
//! minting granularity, lot size, fee split, challenge rewards and the
//! liquidation schedule. They are fixed for the lifetime of a tracker.
//!
//! Prices are the one mutable piece of context: the collateral ratio and
//! every reward conversion depend on the latest class-1 and pool quotes.
//!
//! CRITICAL: All UBA/AMG/wei values are u128, all rates are BIPS (u32)

use crate::core::units::{self, PriceQuote};
use serde::{Deserialize, Serialize};

/// Asset manager parameters relevant to agent accounting.
///
/// # Example
/// ```
/// use fasset_ledger_core_rs::models::context::LedgerSettings;
///
/// let settings = LedgerSettings::default();
/// assert_eq!(settings.lot_size_uba(), 10_000);
/// assert_eq!(settings.uba_to_amg(250), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// UBA per AMG (asset minting granularity)
    pub asset_minting_granularity_uba: u128,

    /// Lot size in AMG; one lot is the minimum mint/redeem quantum
    pub lot_size_amg: u128,

    /// Share of the minting fee that accrues to the collateral pool (BIPS)
    pub pool_fee_share_bips: u32,

    /// Challenger reward as a fraction of backed assets (BIPS)
    pub payment_challenge_reward_bips: u32,

    /// Flat challenger reward component in USD5 units
    pub payment_challenge_reward_usd5: u128,

    /// How long an agent may stay in the collateral call band before
    /// liquidation may begin (seconds)
    pub ccb_time_seconds: u64,

    /// Length of one liquidation premium step (seconds)
    pub liquidation_step_seconds: u64,

    /// Premium added per liquidation step (BIPS of liquidated value)
    pub liquidation_factor_increment_bips: u32,

    /// Largest share of the premium payable from class-1 collateral (BIPS)
    pub liquidation_factor_class1_cap_bips: u32,

    /// Hard cap on the total liquidation premium (BIPS)
    pub liquidation_factor_cap_bips: u32,

    /// Collateral ratio below which liquidation starts immediately (BIPS)
    pub ccb_min_collateral_ratio_bips: u32,

    /// Collateral ratio below which the agent enters the call band (BIPS)
    pub min_collateral_ratio_bips: u32,

    /// Collateral ratio both collaterals must reach to leave liquidation (BIPS)
    pub safety_min_collateral_ratio_bips: u32,

    /// Class-1 payout factor on redemption default (BIPS of redeemed value)
    pub redemption_default_factor_class1_bips: u32,

    /// Pool payout factor on redemption default (BIPS of redeemed value)
    pub redemption_default_factor_pool_bips: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            asset_minting_granularity_uba: 100,
            lot_size_amg: 100,
            pool_fee_share_bips: 4_000,
            payment_challenge_reward_bips: 300,
            payment_challenge_reward_usd5: 300,
            ccb_time_seconds: 180,
            liquidation_step_seconds: 90,
            liquidation_factor_increment_bips: 12_000,
            liquidation_factor_class1_cap_bips: 12_000,
            liquidation_factor_cap_bips: 36_000,
            ccb_min_collateral_ratio_bips: 13_000,
            min_collateral_ratio_bips: 14_000,
            safety_min_collateral_ratio_bips: 15_000,
            redemption_default_factor_class1_bips: 11_000,
            redemption_default_factor_pool_bips: 1_000,
        }
    }
}

impl LedgerSettings {
    /// Lot size in UBA (lot size in AMG times granularity).
    pub fn lot_size_uba(&self) -> u128 {
        self.lot_size_amg * self.asset_minting_granularity_uba
    }

    /// Convert UBA to AMG, rounding down.
    pub fn uba_to_amg(&self, amount_uba: u128) -> u128 {
        units::uba_to_amg(amount_uba, self.asset_minting_granularity_uba)
    }

    /// Convert AMG to UBA (exact).
    pub fn amg_to_uba(&self, amount_amg: u128) -> u128 {
        units::amg_to_uba(amount_amg, self.asset_minting_granularity_uba)
    }

    /// Convert a lot count to UBA (exact).
    pub fn lots_to_uba(&self, lots: u128) -> u128 {
        units::lots_to_uba(lots, self.lot_size_uba())
    }

    /// Pool's share of a minting fee, rounding down.
    pub fn pool_fee_share(&self, fee_uba: u128) -> u128 {
        units::mul_bips(fee_uba, self.pool_fee_share_bips as u128)
    }
}

/// Pricing context: settings plus the latest oracle quotes for both
/// collateral types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerContext {
    pub settings: LedgerSettings,

    /// Quote for the agent vault's class-1 collateral token
    pub class1_price: PriceQuote,

    /// Quote for the collateral pool's token
    pub pool_price: PriceQuote,
}

impl LedgerContext {
    pub fn new(settings: LedgerSettings, class1_price: PriceQuote, pool_price: PriceQuote) -> Self {
        Self {
            settings,
            class1_price,
            pool_price,
        }
    }
}

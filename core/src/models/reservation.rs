//! Collateral reservation model
//!
//! A reservation locks agent collateral for a pending minting. It lives from
//! the CollateralReserved event until the minting is executed or defaulted.
//! Reservation ids are strictly positive; id zero is the self-mint marker on
//! minting events and never corresponds to a stored reservation.

use crate::models::context::LedgerSettings;
use serde::{Deserialize, Serialize};

/// A pending minting backed by reserved collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralReservation {
    /// Reservation id assigned by the asset manager (always > 0)
    pub id: u64,

    /// Account that reserved the collateral and will receive the minted assets
    pub minter: String,

    /// Amount to be minted (UBA)
    pub value_uba: u128,

    /// Minting fee on top of the value (UBA)
    pub fee_uba: u128,

    /// First underlying block in the payment window
    pub first_underlying_block: u64,

    /// Last underlying block of the payment window
    pub last_underlying_block: u64,

    /// Last underlying timestamp of the payment window
    pub last_underlying_timestamp: u64,

    /// Reference the minter's underlying payment must carry
    pub payment_reference: String,
}

impl CollateralReservation {
    /// Pool's share of this reservation's fee at the configured split.
    pub fn pool_fee_share(&self, settings: &LedgerSettings) -> u128 {
        settings.pool_fee_share(self.fee_uba)
    }

    /// Total backing the agent must hold for this reservation: the minted
    /// value plus the pool's fee share (the pool fee is minted too).
    pub fn reserved_uba(&self, settings: &LedgerSettings) -> u128 {
        self.value_uba + self.pool_fee_share(settings)
    }
}

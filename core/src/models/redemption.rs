//! Redemption request model
//!
//! A redemption ties an agent's obligation to pay on the underlying chain to
//! the collateral still backing that obligation. Release happens in two
//! halves: the underlying side (payment confirmed) and the collateral side
//! (payment performed or redemption defaulted). The request is removed only
//! when both halves are released.
//!
//! CRITICAL: All amounts are u128 UBA

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during redemption state transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedemptionError {
    #[error("invalid redemption status")]
    InvalidStatus,
}

/// How the agent's redemption payment turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionPaymentKind {
    /// Paid in full to the redeemer's address
    Performed,
    /// Payment legally blocked on the underlying chain; agent keeps collateral
    Blocked,
    /// Payment made but wrong or short; collateral settlement still pending
    Failed,
}

/// An active redemption request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Request id assigned by the asset manager (always > 0)
    id: u64,

    /// Account redeeming the f-assets
    redeemer: String,

    /// Amount being redeemed (UBA)
    value_uba: u128,

    /// Redemption fee the agent may keep (UBA)
    fee_uba: u128,

    /// First underlying block in the payment window
    first_underlying_block: u64,

    /// Last underlying block of the payment window
    last_underlying_block: u64,

    /// Last underlying timestamp of the payment window
    last_underlying_timestamp: u64,

    /// Underlying address the agent must pay
    payment_address: String,

    /// Reference the agent's payment must carry
    payment_reference: String,

    /// True when this redemption was raised by the collateral pool closing
    /// its own position; such redemptions do not count toward the pool's
    /// redeeming total
    pool_self_close: bool,

    /// Collateral side released (payment performed/blocked, or defaulted)
    collateral_released: bool,

    /// Underlying side released (payment confirmed in any outcome)
    underlying_released: bool,
}

impl RedemptionRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        redeemer: String,
        value_uba: u128,
        fee_uba: u128,
        first_underlying_block: u64,
        last_underlying_block: u64,
        last_underlying_timestamp: u64,
        payment_address: String,
        payment_reference: String,
        pool_self_close: bool,
    ) -> Self {
        Self {
            id,
            redeemer,
            value_uba,
            fee_uba,
            first_underlying_block,
            last_underlying_block,
            last_underlying_timestamp,
            payment_address,
            payment_reference,
            pool_self_close,
            collateral_released: false,
            underlying_released: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn redeemer(&self) -> &str {
        &self.redeemer
    }

    pub fn value_uba(&self) -> u128 {
        self.value_uba
    }

    pub fn fee_uba(&self) -> u128 {
        self.fee_uba
    }

    /// Amount the agent must deliver to the redeemer: value minus fee.
    pub fn payment_value_uba(&self) -> u128 {
        self.value_uba - self.fee_uba
    }

    pub fn first_underlying_block(&self) -> u64 {
        self.first_underlying_block
    }

    pub fn last_underlying_block(&self) -> u64 {
        self.last_underlying_block
    }

    pub fn last_underlying_timestamp(&self) -> u64 {
        self.last_underlying_timestamp
    }

    pub fn payment_address(&self) -> &str {
        &self.payment_address
    }

    pub fn payment_reference(&self) -> &str {
        &self.payment_reference
    }

    pub fn pool_self_close(&self) -> bool {
        self.pool_self_close
    }

    pub fn collateral_released(&self) -> bool {
        self.collateral_released
    }

    pub fn underlying_released(&self) -> bool {
        self.underlying_released
    }

    /// Release the collateral side after a default.
    ///
    /// Fails when the collateral side was already settled, so a redemption
    /// cannot be defaulted twice or defaulted after a performed payment.
    pub fn release_collateral_by_default(&mut self) -> Result<(), RedemptionError> {
        if self.collateral_released {
            return Err(RedemptionError::InvalidStatus);
        }
        self.collateral_released = true;
        Ok(())
    }

    /// Release after the agent's payment was confirmed.
    ///
    /// The underlying side is always released. The collateral side is
    /// released for performed and blocked payments; a failed payment leaves
    /// collateral held until the redeemer defaults the request.
    pub fn release_by_payment(
        &mut self,
        kind: RedemptionPaymentKind,
    ) -> Result<(), RedemptionError> {
        if self.underlying_released {
            return Err(RedemptionError::InvalidStatus);
        }
        self.underlying_released = true;
        match kind {
            RedemptionPaymentKind::Performed | RedemptionPaymentKind::Blocked => {
                self.collateral_released = true;
            }
            RedemptionPaymentKind::Failed => {}
        }
        Ok(())
    }

    /// True when both halves are released and the request can be removed.
    pub fn fully_released(&self) -> bool {
        self.collateral_released && self.underlying_released
    }
}

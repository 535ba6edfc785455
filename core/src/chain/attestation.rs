//! Attested underlying-chain facts
//!
//! The tracker never reads the underlying chain directly. Operations that
//! depend on underlying payments take attested proofs: either a payment that
//! happened, or the nonexistence of a referenced payment within a block
//! window. Proof authenticity is the attestation layer's concern; the types
//! here carry the attested content only.

use serde::{Deserialize, Serialize};

/// Attested underlying payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Underlying transaction hash
    pub tx_hash: String,

    /// Address the payment left
    pub source_address: String,

    /// Address the payment arrived at
    pub target_address: String,

    /// Payment reference carried by the transaction (empty when none)
    pub payment_reference: String,

    /// Everything that left the source, fees included (UBA)
    pub spent_uba: u128,

    /// What arrived at the target (UBA)
    pub received_uba: u128,

    /// Block the transaction was included in
    pub block_number: u64,

    /// Timestamp of that block
    pub block_timestamp: u64,
}

/// Attested nonexistence of a referenced payment.
///
/// Proves that within blocks `first_block..=last_block` no payment carrying
/// `payment_reference` delivered at least `amount_uba` to
/// `destination_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonExistencePaymentProof {
    pub payment_reference: String,
    pub destination_address: String,
    pub amount_uba: u128,

    /// First block covered by the search window
    pub first_block: u64,

    /// Last block covered by the search window
    pub last_block: u64,

    /// Timestamp of the last covered block
    pub last_block_timestamp: u64,
}

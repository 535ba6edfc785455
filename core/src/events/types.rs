//! Chain event types driving the ledger
//!
//! The tracker does not observe the asset manager directly; it consumes a
//! stream of confirmed chain events and derives ledger state from them.
//!
//! # Design Principles
//!
//! 1. **Determinism**: replaying the same event stream yields the same state
//! 2. **Money is u128**: UBA and collateral wei are unsigned integers
//! 3. **Self-contained**: every event carries all data needed to apply it
//! 4. **Logged**: each application emits facts for replay comparison

use serde::{Deserialize, Serialize};

use crate::models::{CollateralClass, RedemptionPaymentKind};

/// A confirmed chain event, in intake order.
///
/// Events that require attested payment proofs (defaults, challenges) are
/// tracker operations instead; everything the chain reports directly is here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    /// New agent vault created
    AgentCreated {
        agent_vault: String,
        owner: String,
        underlying_address: String,
    },

    /// Minter reserved collateral for a future minting
    ///
    /// `value_uba` is the amount to be minted; the agent's fee and the
    /// derived pool fee share are reserved on top of it.
    CollateralReserved {
        agent_vault: String,
        reservation_id: u64,
        minter: String,
        value_uba: u128,
        fee_uba: u128,
        first_underlying_block: u64,
        last_underlying_block: u64,
        last_underlying_timestamp: u64,
        payment_reference: String,
    },

    /// Minting payment confirmed and f-assets minted
    ///
    /// `reservation_id` zero is an agent self-mint without a reservation.
    MintingExecuted {
        agent_vault: String,
        reservation_id: u64,
        redemption_ticket_id: u64,
        minted_uba: u128,
        agent_fee_uba: u128,
        pool_fee_uba: u128,
    },

    /// Minter failed to pay in time; the reservation is released
    MintingPaymentDefault {
        agent_vault: String,
        reservation_id: u64,
    },

    /// Agent burned its own f-assets to free backing
    SelfClose { agent_vault: String, value_uba: u128 },

    /// Redeemer requested redemption against this agent
    RedemptionRequested {
        agent_vault: String,
        request_id: u64,
        redeemer: String,
        value_uba: u128,
        fee_uba: u128,
        first_underlying_block: u64,
        last_underlying_block: u64,
        last_underlying_timestamp: u64,
        payment_address: String,
        payment_reference: String,
        /// Pool token redemption: the pool side is not released by it
        pool_self_close: bool,
    },

    /// Agent's redemption payment confirmed, in whatever final state
    RedemptionPaymentConfirmed {
        agent_vault: String,
        request_id: u64,
        kind: RedemptionPaymentKind,
        spent_uba: u128,
    },

    /// Agent announced an underlying withdrawal
    UnderlyingWithdrawalAnnounced {
        agent_vault: String,
        announcement_id: u64,
    },

    /// Announced withdrawal payment confirmed
    UnderlyingWithdrawalConfirmed {
        agent_vault: String,
        announcement_id: u64,
        spent_uba: u128,
    },

    /// Announced withdrawal cancelled without a payment
    UnderlyingWithdrawalCancelled {
        agent_vault: String,
        announcement_id: u64,
    },

    /// Confirmed deposit to the agent's underlying address
    UnderlyingTopup { agent_vault: String, amount_uba: u128 },

    /// Provider entered the agent's collateral pool
    PoolEnter {
        agent_vault: String,
        holder: String,
        tokens: u128,
        paid_fees_uba: u128,
    },

    /// Provider exited the pool, burning tokens and taking fees
    PoolExit {
        agent_vault: String,
        holder: String,
        burned_tokens: u128,
        received_fees_uba: u128,
    },

    /// Secondary-market pool token transfer
    PoolTokenTransfer {
        agent_vault: String,
        from: String,
        to: String,
        tokens: u128,
    },

    /// Provider withdrew accrued f-asset fees
    PoolFeesWithdrawn {
        agent_vault: String,
        holder: String,
        amount_uba: u128,
    },

    /// Collateral deposited into the vault or pool
    CollateralDeposited {
        agent_vault: String,
        collateral: CollateralClass,
        amount_wei: u128,
    },

    /// Collateral withdrawn; only a healthy agent may withdraw
    CollateralWithdrawn {
        agent_vault: String,
        collateral: CollateralClass,
        amount_wei: u128,
    },

    /// Chain reported the agent's dust value, for cross-checking
    DustChanged { agent_vault: String, dust_uba: u128 },

    /// Lot-aligned dust folded back into a redemption ticket
    DustConvertedToTicket {
        agent_vault: String,
        ticket_id: u64,
    },

    /// Announced destruction executed; the agent leaves the ledger
    AgentDestroyed { agent_vault: String },
}

impl ChainEvent {
    /// Vault of the agent this event concerns.
    pub fn agent_vault(&self) -> &str {
        match self {
            ChainEvent::AgentCreated { agent_vault, .. }
            | ChainEvent::CollateralReserved { agent_vault, .. }
            | ChainEvent::MintingExecuted { agent_vault, .. }
            | ChainEvent::MintingPaymentDefault { agent_vault, .. }
            | ChainEvent::SelfClose { agent_vault, .. }
            | ChainEvent::RedemptionRequested { agent_vault, .. }
            | ChainEvent::RedemptionPaymentConfirmed { agent_vault, .. }
            | ChainEvent::UnderlyingWithdrawalAnnounced { agent_vault, .. }
            | ChainEvent::UnderlyingWithdrawalConfirmed { agent_vault, .. }
            | ChainEvent::UnderlyingWithdrawalCancelled { agent_vault, .. }
            | ChainEvent::UnderlyingTopup { agent_vault, .. }
            | ChainEvent::PoolEnter { agent_vault, .. }
            | ChainEvent::PoolExit { agent_vault, .. }
            | ChainEvent::PoolTokenTransfer { agent_vault, .. }
            | ChainEvent::PoolFeesWithdrawn { agent_vault, .. }
            | ChainEvent::CollateralDeposited { agent_vault, .. }
            | ChainEvent::CollateralWithdrawn { agent_vault, .. }
            | ChainEvent::DustChanged { agent_vault, .. }
            | ChainEvent::DustConvertedToTicket { agent_vault, .. }
            | ChainEvent::AgentDestroyed { agent_vault } => agent_vault,
        }
    }
}

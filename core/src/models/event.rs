//! Ledger facts for audit and replay
//!
//! Every state change the tracker derives from chain events or enforcement
//! operations is logged as a fact. Facts enable:
//! - Auditing (what the ledger concluded and when)
//! - Downstream consumers (bots react to facts, not raw events)
//! - Debugging divergence between the ledger and the chain
//!
//! Facts carry the ledger timestamp at which they were derived.

use crate::models::agent::{AgentStatus, CollateralClass};
use crate::models::underlying::UnderlyingChangeKind;
use serde::{Deserialize, Serialize};

/// Which challenge proved the agent's misbehavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    IllegalPayment,
    DoublePayment,
    FreeBalanceNegative,
}

/// A state change derived by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerFact {
    /// New agent registered with the ledger
    AgentRegistered {
        timestamp: u64,
        agent_vault: String,
        underlying_address: String,
    },

    /// Collateral reservation opened for a pending minting
    ReservationCreated {
        timestamp: u64,
        agent_vault: String,
        reservation_id: u64,
        value_uba: u128,
        fee_uba: u128,
    },

    /// Reservation removed; `executed` tells minting from default
    ReservationClosed {
        timestamp: u64,
        agent_vault: String,
        reservation_id: u64,
        executed: bool,
    },

    /// Redemption ticket created by an executed minting
    TicketCreated {
        timestamp: u64,
        agent_vault: String,
        ticket_id: u64,
        value_uba: u128,
    },

    /// Ticket partially closed
    TicketShrunk {
        timestamp: u64,
        agent_vault: String,
        ticket_id: u64,
        value_uba: u128,
    },

    /// Ticket fully closed and removed
    TicketDeleted {
        timestamp: u64,
        agent_vault: String,
        ticket_id: u64,
    },

    /// Agent's dust changed (new value)
    DustChanged {
        timestamp: u64,
        agent_vault: String,
        dust_uba: u128,
    },

    /// Redemption request opened
    RedemptionStarted {
        timestamp: u64,
        agent_vault: String,
        request_id: u64,
        value_uba: u128,
    },

    /// Redemption request fully released and removed
    RedemptionClosed {
        timestamp: u64,
        agent_vault: String,
        request_id: u64,
    },

    /// Redemption defaulted; redeemer compensated from collateral
    RedemptionDefaulted {
        timestamp: u64,
        agent_vault: String,
        request_id: u64,
        paid_class1_wei: u128,
        paid_pool_wei: u128,
    },

    /// Accounted underlying balance changed (new balance included)
    UnderlyingChanged {
        timestamp: u64,
        agent_vault: String,
        kind: UnderlyingChangeKind,
        amount_uba: i128,
        balance_uba: i128,
    },

    /// Underlying withdrawal announced
    WithdrawalAnnounced {
        timestamp: u64,
        agent_vault: String,
        announcement_id: u64,
    },

    /// Withdrawal announcement closed; `confirmed` tells paid from cancelled
    WithdrawalClosed {
        timestamp: u64,
        agent_vault: String,
        announcement_id: u64,
        confirmed: bool,
    },

    /// Pool position changed for one holder (balances after the change)
    PoolPositionChanged {
        timestamp: u64,
        agent_vault: String,
        holder: String,
        token_balance: u128,
        fee_debt_uba: i128,
    },

    /// Agent status transition
    StatusChanged {
        timestamp: u64,
        agent_vault: String,
        status: AgentStatus,
    },

    /// Liquidator burned f-assets against the agent and was paid a premium
    LiquidationPerformed {
        timestamp: u64,
        agent_vault: String,
        liquidator: String,
        liquidated_uba: u128,
        paid_class1_wei: u128,
        paid_pool_wei: u128,
    },

    /// Challenge confirmed, agent moved to full liquidation
    ChallengeConfirmed {
        timestamp: u64,
        agent_vault: String,
        challenger: String,
        kind: ChallengeKind,
        rewarded_class1_wei: u128,
    },

    /// Collateral balance changed for one class (new total included)
    CollateralChanged {
        timestamp: u64,
        agent_vault: String,
        collateral: CollateralClass,
        total_wei: u128,
    },

    /// Agent wound down and removed from the ledger
    AgentDestroyed { timestamp: u64, agent_vault: String },
}

impl LedgerFact {
    /// Ledger timestamp at which this fact was derived.
    pub fn timestamp(&self) -> u64 {
        match self {
            LedgerFact::AgentRegistered { timestamp, .. }
            | LedgerFact::ReservationCreated { timestamp, .. }
            | LedgerFact::ReservationClosed { timestamp, .. }
            | LedgerFact::TicketCreated { timestamp, .. }
            | LedgerFact::TicketShrunk { timestamp, .. }
            | LedgerFact::TicketDeleted { timestamp, .. }
            | LedgerFact::DustChanged { timestamp, .. }
            | LedgerFact::RedemptionStarted { timestamp, .. }
            | LedgerFact::RedemptionClosed { timestamp, .. }
            | LedgerFact::RedemptionDefaulted { timestamp, .. }
            | LedgerFact::UnderlyingChanged { timestamp, .. }
            | LedgerFact::WithdrawalAnnounced { timestamp, .. }
            | LedgerFact::WithdrawalClosed { timestamp, .. }
            | LedgerFact::PoolPositionChanged { timestamp, .. }
            | LedgerFact::StatusChanged { timestamp, .. }
            | LedgerFact::LiquidationPerformed { timestamp, .. }
            | LedgerFact::ChallengeConfirmed { timestamp, .. }
            | LedgerFact::CollateralChanged { timestamp, .. }
            | LedgerFact::AgentDestroyed { timestamp, .. } => *timestamp,
        }
    }

    /// Agent vault this fact concerns.
    pub fn agent_vault(&self) -> &str {
        match self {
            LedgerFact::AgentRegistered { agent_vault, .. }
            | LedgerFact::ReservationCreated { agent_vault, .. }
            | LedgerFact::ReservationClosed { agent_vault, .. }
            | LedgerFact::TicketCreated { agent_vault, .. }
            | LedgerFact::TicketShrunk { agent_vault, .. }
            | LedgerFact::TicketDeleted { agent_vault, .. }
            | LedgerFact::DustChanged { agent_vault, .. }
            | LedgerFact::RedemptionStarted { agent_vault, .. }
            | LedgerFact::RedemptionClosed { agent_vault, .. }
            | LedgerFact::RedemptionDefaulted { agent_vault, .. }
            | LedgerFact::UnderlyingChanged { agent_vault, .. }
            | LedgerFact::WithdrawalAnnounced { agent_vault, .. }
            | LedgerFact::WithdrawalClosed { agent_vault, .. }
            | LedgerFact::PoolPositionChanged { agent_vault, .. }
            | LedgerFact::StatusChanged { agent_vault, .. }
            | LedgerFact::LiquidationPerformed { agent_vault, .. }
            | LedgerFact::ChallengeConfirmed { agent_vault, .. }
            | LedgerFact::CollateralChanged { agent_vault, .. }
            | LedgerFact::AgentDestroyed { agent_vault, .. } => agent_vault,
        }
    }

    /// Stable snake_case name of the fact variant (matches the serialized tag).
    pub fn fact_type(&self) -> &'static str {
        match self {
            LedgerFact::AgentRegistered { .. } => "agent_registered",
            LedgerFact::ReservationCreated { .. } => "reservation_created",
            LedgerFact::ReservationClosed { .. } => "reservation_closed",
            LedgerFact::TicketCreated { .. } => "ticket_created",
            LedgerFact::TicketShrunk { .. } => "ticket_shrunk",
            LedgerFact::TicketDeleted { .. } => "ticket_deleted",
            LedgerFact::DustChanged { .. } => "dust_changed",
            LedgerFact::RedemptionStarted { .. } => "redemption_started",
            LedgerFact::RedemptionClosed { .. } => "redemption_closed",
            LedgerFact::RedemptionDefaulted { .. } => "redemption_defaulted",
            LedgerFact::UnderlyingChanged { .. } => "underlying_changed",
            LedgerFact::WithdrawalAnnounced { .. } => "withdrawal_announced",
            LedgerFact::WithdrawalClosed { .. } => "withdrawal_closed",
            LedgerFact::PoolPositionChanged { .. } => "pool_position_changed",
            LedgerFact::StatusChanged { .. } => "status_changed",
            LedgerFact::LiquidationPerformed { .. } => "liquidation_performed",
            LedgerFact::ChallengeConfirmed { .. } => "challenge_confirmed",
            LedgerFact::CollateralChanged { .. } => "collateral_changed",
            LedgerFact::AgentDestroyed { .. } => "agent_destroyed",
        }
    }
}

/// Fact log for storing and querying derived facts.
///
/// A simple wrapper around Vec<LedgerFact> with convenience methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactLog {
    facts: Vec<LedgerFact>,
}

impl FactLog {
    pub fn new() -> Self {
        Self { facts: Vec::new() }
    }

    /// Append a fact to the log
    pub fn log(&mut self, fact: LedgerFact) {
        self.facts.push(fact);
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn facts(&self) -> &[LedgerFact] {
        &self.facts
    }

    /// Get facts for a specific agent
    pub fn facts_for_agent(&self, agent_vault: &str) -> Vec<&LedgerFact> {
        self.facts
            .iter()
            .filter(|f| f.agent_vault() == agent_vault)
            .collect()
    }

    /// Get facts of a specific type
    pub fn facts_of_type(&self, fact_type: &str) -> Vec<&LedgerFact> {
        self.facts
            .iter()
            .filter(|f| f.fact_type() == fact_type)
            .collect()
    }

    /// Take all facts out of the log, leaving it empty
    pub fn take(&mut self) -> Vec<LedgerFact> {
        std::mem::take(&mut self.facts)
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }
}

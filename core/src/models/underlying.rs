//! Underlying balance ledger
//!
//! Tracks every accounted movement on the agent's underlying address as a
//! signed change with a cause. The running total is the agent's accounted
//! underlying balance; the free part is whatever exceeds the backing still
//! owed to minters and redeemers (computed by the agent ledger, which knows
//! the minted and redeeming totals).
//!
//! CRITICAL: Changes are i128 UBA (deposits positive, spends negative)

use serde::{Deserialize, Serialize};

/// Why an underlying balance change was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderlyingChangeKind {
    /// Minter's deposit arriving with an executed minting
    Minting,
    /// Agent's outgoing redemption payment
    Redemption,
    /// Agent topping up its own underlying address
    Topup,
    /// Announced withdrawal leaving the address
    Withdrawal,
}

/// One accounted movement on the underlying address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlyingBalanceChange {
    pub amount_uba: i128,
    pub kind: UnderlyingChangeKind,
}

/// Append-only log of underlying balance changes for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlyingLedger {
    changes: Vec<UnderlyingBalanceChange>,
}

impl UnderlyingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(changes: Vec<UnderlyingBalanceChange>) -> Self {
        Self { changes }
    }

    /// Record a movement. Deposits are positive, spends negative.
    pub fn record(&mut self, kind: UnderlyingChangeKind, amount_uba: i128) {
        self.changes.push(UnderlyingBalanceChange { amount_uba, kind });
    }

    /// Accounted balance: sum of all recorded changes.
    pub fn balance_uba(&self) -> i128 {
        self.changes.iter().map(|c| c.amount_uba).sum()
    }

    pub fn changes(&self) -> &[UnderlyingBalanceChange] {
        &self.changes
    }
}

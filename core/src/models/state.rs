//! Ledger state
//!
//! The complete state the tracker maintains: every registered agent's
//! accounting, indexed by vault address.
//!
//! # Critical Invariants
//!
//! 1. **Vault Uniqueness**: Each vault address appears exactly once
//! 2. **Per-Agent Consistency**: Every agent ledger passes its own
//!    invariant check (running totals match the books)

use crate::models::agent::AgentLedger;
use crate::models::context::LedgerSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur at the ledger state level
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("agent {vault} already registered")]
    DuplicateAgent { vault: String },

    #[error("unknown agent {vault}")]
    UnknownAgent { vault: String },
}

/// All tracked agents, indexed by vault address.
///
/// # Example
///
/// ```rust
/// use fasset_ledger_core_rs::models::agent::AgentLedger;
/// use fasset_ledger_core_rs::models::state::LedgerState;
///
/// let mut state = LedgerState::new();
/// let agent = AgentLedger::new(
///     "vault_1".to_string(),
///     "owner_1".to_string(),
///     "UNDERLYING_1".to_string(),
/// );
/// state.register_agent(agent).unwrap();
/// assert_eq!(state.num_agents(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    agents: HashMap<String, AgentLedger>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn register_agent(&mut self, agent: AgentLedger) -> Result<(), StateError> {
        if self.agents.contains_key(agent.vault()) {
            return Err(StateError::DuplicateAgent {
                vault: agent.vault().to_string(),
            });
        }
        self.agents.insert(agent.vault().to_string(), agent);
        Ok(())
    }

    pub fn remove_agent(&mut self, vault: &str) -> Result<AgentLedger, StateError> {
        self.agents.remove(vault).ok_or_else(|| StateError::UnknownAgent {
            vault: vault.to_string(),
        })
    }

    pub fn agent(&self, vault: &str) -> Result<&AgentLedger, StateError> {
        self.agents.get(vault).ok_or_else(|| StateError::UnknownAgent {
            vault: vault.to_string(),
        })
    }

    pub fn agent_mut(&mut self, vault: &str) -> Result<&mut AgentLedger, StateError> {
        self.agents
            .get_mut(vault)
            .ok_or_else(|| StateError::UnknownAgent {
                vault: vault.to_string(),
            })
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentLedger> {
        self.agents.values()
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    /// Backing minted across all agents (tickets plus dust).
    pub fn total_minted_uba(&self) -> u128 {
        self.agents.values().map(|a| a.minted_uba()).sum()
    }

    /// Backing reserved for pending mintings across all agents.
    pub fn total_reserved_uba(&self) -> u128 {
        self.agents.values().map(|a| a.reserved_uba()).sum()
    }

    /// Backing in active redemptions across all agents.
    pub fn total_redeeming_uba(&self) -> u128 {
        self.agents.values().map(|a| a.redeeming_uba()).sum()
    }

    /// Run every agent's invariant check; one line per violation.
    pub fn check_invariants(&self, settings: &LedgerSettings) -> Vec<String> {
        let mut violations = Vec::new();
        for agent in self.agents.values() {
            violations.extend(agent.check_invariants(settings));
        }
        violations
    }
}

//! Snapshot and restore
//!
//! Serializable snapshots of the complete tracker state. A snapshot embeds
//! a hash of the settings it was taken under, so a restore can never
//! silently replay an old ledger under different rules.
//!
//! Each agent entry carries redundant summary columns next to the full
//! ledger. They make snapshots greppable on disk and give validation a
//! cross-check: a snapshot whose summary disagrees with its own ledger is
//! rejected.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::units::PriceQuote;
use crate::models::{AgentLedger, AgentStatus, LedgerSettings};
use crate::tracker::engine::TrackerError;

// ============================================================================
// Snapshot Types
// ============================================================================

/// Complete tracker state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Ledger clock at capture time
    pub now: u64,

    /// Canonical hash of the settings the ledger ran under
    pub settings_hash: String,

    /// Class-1 collateral quote at capture time
    pub class1_price: PriceQuote,

    /// Pool collateral quote at capture time
    pub pool_price: PriceQuote,

    /// Every registered agent, sorted by vault address
    pub agents: Vec<AgentSnapshot>,
}

/// One agent's state plus its headline figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub vault: String,
    pub status: AgentStatus,
    pub minted_uba: u128,
    pub reserved_uba: u128,
    pub redeeming_uba: u128,
    pub underlying_balance_uba: i128,

    /// The complete agent ledger; the summary fields above restate it
    pub ledger: AgentLedger,
}

impl From<&AgentLedger> for AgentSnapshot {
    fn from(agent: &AgentLedger) -> Self {
        Self {
            vault: agent.vault().to_string(),
            status: agent.status(),
            minted_uba: agent.minted_uba(),
            reserved_uba: agent.reserved_uba(),
            redeeming_uba: agent.redeeming_uba(),
            underlying_balance_uba: agent.underlying_balance_uba(),
            ledger: agent.clone(),
        }
    }
}

impl From<AgentSnapshot> for AgentLedger {
    fn from(snapshot: AgentSnapshot) -> Self {
        snapshot.ledger
    }
}

// ============================================================================
// Settings Hash
// ============================================================================

/// Compute a deterministic hash of the ledger settings.
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field or map iteration order.
pub fn compute_settings_hash(settings: &LedgerSettings) -> Result<String, TrackerError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(settings).map_err(|e| {
        TrackerError::Serialization(format!("settings serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        TrackerError::Serialization(format!("settings serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a snapshot against the settings it will be restored under.
///
/// Checks, in order:
/// 1. The settings hash matches
/// 2. Vault addresses are unique
/// 3. Each agent's summary columns match its own ledger
/// 4. Each agent ledger passes its invariant check
pub fn validate_snapshot(
    snapshot: &LedgerSnapshot,
    settings: &LedgerSettings,
) -> Result<(), TrackerError> {
    let expected_hash = compute_settings_hash(settings)?;
    if snapshot.settings_hash != expected_hash {
        return Err(TrackerError::Snapshot(format!(
            "settings hash mismatch: snapshot has {}, current settings hash to {}",
            snapshot.settings_hash, expected_hash
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for agent in &snapshot.agents {
        if !seen.insert(agent.vault.as_str()) {
            return Err(TrackerError::Snapshot(format!(
                "duplicate vault {} in snapshot",
                agent.vault
            )));
        }
    }

    for agent in &snapshot.agents {
        let ledger = &agent.ledger;
        if agent.vault != ledger.vault()
            || agent.status != ledger.status()
            || agent.minted_uba != ledger.minted_uba()
            || agent.reserved_uba != ledger.reserved_uba()
            || agent.redeeming_uba != ledger.redeeming_uba()
            || agent.underlying_balance_uba != ledger.underlying_balance_uba()
        {
            return Err(TrackerError::Snapshot(format!(
                "agent {} summary disagrees with its ledger",
                agent.vault
            )));
        }

        let violations = ledger.check_invariants(settings);
        if !violations.is_empty() {
            return Err(TrackerError::Snapshot(format!(
                "agent {} fails invariants: {}",
                agent.vault,
                violations.join("; ")
            )));
        }
    }

    Ok(())
}

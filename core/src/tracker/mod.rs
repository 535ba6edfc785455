//! The tracker: the ledger's public face
//!
//! [`engine::LedgerTracker`] ties everything together: it owns the state,
//! the pricing context, the clock and the fact log, applies chain events,
//! runs enforcement and audits the books. [`checkpoint`] persists and
//! restores the whole thing.

pub mod checkpoint;
pub mod engine;

pub use checkpoint::{compute_settings_hash, validate_snapshot, AgentSnapshot, LedgerSnapshot};
pub use engine::{
    AgentInfo, LedgerTracker, LiquidationOutcome, RedemptionDefaultOutcome, TrackerError,
};

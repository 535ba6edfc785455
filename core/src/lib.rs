//! FAsset Ledger Core - Rust Engine
//!
//! Off-chain accounting and enforcement tracker for FAsset agents, with
//! deterministic replay.
//!
//! # Architecture
//!
//! - **core**: Fixed-point units, prices and payment references
//! - **models**: Domain types (AgentLedger, tickets, redemptions, pool, facts)
//! - **events**: Chain event intake and application
//! - **enforcement**: Challenges and liquidation
//! - **tracker**: Top-level engine, audits and snapshots
//! - **chain**: Mock underlying chain and attestation proofs
//!
//! # Critical Invariants
//!
//! 1. All money values are unsigned integers (UBA, AMG, wei); only the
//!    underlying balance is signed
//! 2. Replaying the same event stream yields the same state and facts
//! 3. FFI boundary is minimal and safe

// Module declarations
pub mod chain;
pub mod core;
pub mod enforcement;
pub mod events;
pub mod models;
pub mod tracker;

// Re-exports for convenience
pub use crate::core::units::{PriceQuote, MAX_BIPS, PRICE_SCALE};
pub use chain::{ChainError, MockChain, NonExistencePaymentProof, PaymentProof};
pub use enforcement::{ChallengeError, LiquidationError};
pub use events::{ChainEvent, EventError};
pub use models::{
    AgentError, AgentLedger, AgentStatus, CollateralClass, FactLog, LedgerContext, LedgerFact,
    LedgerSettings, LedgerState, StateError,
};
pub use tracker::{
    AgentInfo, AgentSnapshot, LedgerSnapshot, LedgerTracker, LiquidationOutcome,
    RedemptionDefaultOutcome, TrackerError,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn fasset_ledger_core_rs(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<ffi::tracker::PyLedgerTracker>()?;
    Ok(())
}

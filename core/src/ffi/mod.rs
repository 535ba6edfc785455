//! FFI boundary
//!
//! Python bindings over the tracker. The boundary is dict-in, dict-out:
//! [`types`] converts, [`tracker`] wraps. Nothing in here holds ledger
//! logic of its own.

pub mod tracker;
pub mod types;

pub use tracker::PyLedgerTracker;

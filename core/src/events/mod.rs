//! Chain event intake
//!
//! Confirmed chain events arrive in intake order and are applied one at a
//! time. Each application validates against the current ledger state, then
//! commits and emits facts. See [`types::ChainEvent`] for the event set and
//! [`handler`] for the application logic.

pub mod handler;
pub mod types;

pub use handler::EventError;
pub use types::ChainEvent;

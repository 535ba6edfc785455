//! Domain models for the agent ledger

pub mod agent;
pub mod context;
pub mod event;
pub mod pool;
pub mod redemption;
pub mod reservation;
pub mod state;
pub mod ticket;
pub mod underlying;

// Re-exports
pub use agent::{
    AgentError, AgentLedger, AgentStatus, CollateralClass, MintingOutcome,
    RedemptionPaymentOutcome,
};
pub use context::{LedgerContext, LedgerSettings};
pub use event::{ChallengeKind, FactLog, LedgerFact};
pub use pool::{PoolError, PoolShares};
pub use redemption::{RedemptionError, RedemptionPaymentKind, RedemptionRequest};
pub use reservation::CollateralReservation;
pub use state::{LedgerState, StateError};
pub use ticket::{CloseOutcome, MintOutcome, RedemptionTicket, TicketBook, TicketChange, TicketError};
pub use underlying::{UnderlyingBalanceChange, UnderlyingChangeKind, UnderlyingLedger};

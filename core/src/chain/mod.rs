//! Underlying chain: attested proofs and an in-memory mock

pub mod attestation;
pub mod mock;

pub use attestation::{NonExistencePaymentProof, PaymentProof};
pub use mock::{ChainError, MockChain, MockTransaction};

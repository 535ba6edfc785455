//! In-memory underlying chain
//!
//! A deterministic stand-in for the underlying chain, used by tests and the
//! scenario driver. It tracks balances and transactions, advances block
//! height and time on demand, and can attest its own history as
//! [`PaymentProof`] / [`NonExistencePaymentProof`] values.
//!
//! # Critical Invariants
//!
//! - Transaction hashes are unique: the hash input includes a per-chain
//!   nonce that increments on every accepted transaction.
//! - A transaction debits `amount + fee` from the source and credits
//!   `amount` to the target; the fee disappears (burned gas).
//! - Block number and timestamp never move backwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::chain::attestation::{NonExistencePaymentProof, PaymentProof};

/// Errors from mock chain operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("insufficient funds on {address}: have {balance} UBA, need {required} UBA")]
    InsufficientFunds {
        address: String,
        balance: u128,
        required: u128,
    },

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}

/// A transaction recorded on the mock chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockTransaction {
    pub hash: String,
    pub source_address: String,
    pub target_address: String,
    /// Credited to the target (UBA)
    pub amount_uba: u128,
    /// Burned on top of the amount (UBA)
    pub fee_uba: u128,
    pub payment_reference: String,
    pub block_number: u64,
    pub block_timestamp: u64,
}

impl MockTransaction {
    /// Everything the source paid, fee included.
    pub fn spent_uba(&self) -> u128 {
        self.amount_uba + self.fee_uba
    }
}

/// Deterministic in-memory underlying chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockChain {
    balances: HashMap<String, u128>,
    transactions: Vec<MockTransaction>,
    block_number: u64,
    block_timestamp: u64,
    /// Added to the block timestamp whenever the block number advances by one
    seconds_per_block: u64,
    nonce: u64,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
            transactions: Vec::new(),
            block_number: 1,
            block_timestamp: 1,
            seconds_per_block: 1,
            nonce: 0,
        }
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn block_timestamp(&self) -> u64 {
        self.block_timestamp
    }

    pub fn balance(&self, address: &str) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Credits an address out of thin air. Test setup only.
    pub fn mint(&mut self, address: &str, amount_uba: u128) {
        *self.balances.entry(address.to_string()).or_insert(0) += amount_uba;
    }

    /// Advances the chain by `blocks`, moving the timestamp along with it.
    pub fn skip_blocks(&mut self, blocks: u64) {
        self.block_number += blocks;
        self.block_timestamp += blocks * self.seconds_per_block;
    }

    /// Advances time without mining. The next transaction still lands on the
    /// next block, so a pure time skip also bumps the height by one.
    pub fn skip_time(&mut self, seconds: u64) {
        self.block_timestamp += seconds;
        self.block_number += 1;
    }

    /// Executes a payment and records it at the current block height.
    pub fn add_transaction(
        &mut self,
        source: &str,
        target: &str,
        amount_uba: u128,
        fee_uba: u128,
        payment_reference: &str,
    ) -> Result<MockTransaction, ChainError> {
        let required = amount_uba + fee_uba;
        let balance = self.balance(source);
        if balance < required {
            return Err(ChainError::InsufficientFunds {
                address: source.to_string(),
                balance,
                required,
            });
        }

        self.balances.insert(source.to_string(), balance - required);
        *self.balances.entry(target.to_string()).or_insert(0) += amount_uba;
        self.block_number += 1;
        self.block_timestamp += self.seconds_per_block;

        let hash = self.transaction_hash(source, target, amount_uba, fee_uba, payment_reference);
        self.nonce += 1;

        let tx = MockTransaction {
            hash,
            source_address: source.to_string(),
            target_address: target.to_string(),
            amount_uba,
            fee_uba,
            payment_reference: payment_reference.to_string(),
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
        };
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    pub fn transaction(&self, hash: &str) -> Option<&MockTransaction> {
        self.transactions.iter().find(|tx| tx.hash == hash)
    }

    pub fn transactions_with_reference(&self, reference: &str) -> Vec<&MockTransaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.payment_reference == reference)
            .collect()
    }

    /// Attests a recorded transaction as a payment proof.
    pub fn payment_proof(&self, hash: &str) -> Result<PaymentProof, ChainError> {
        let tx = self
            .transaction(hash)
            .ok_or_else(|| ChainError::UnknownTransaction(hash.to_string()))?;
        Ok(PaymentProof {
            tx_hash: tx.hash.clone(),
            source_address: tx.source_address.clone(),
            target_address: tx.target_address.clone(),
            payment_reference: tx.payment_reference.clone(),
            spent_uba: tx.spent_uba(),
            received_uba: tx.amount_uba,
            block_number: tx.block_number,
            block_timestamp: tx.block_timestamp,
        })
    }

    /// Attests that no payment carrying `reference` delivered at least
    /// `amount_uba` to `destination` anywhere in the recorded history.
    ///
    /// Returns `None` when such a payment exists, in which case nonexistence
    /// cannot be attested.
    pub fn non_existence_proof(
        &self,
        reference: &str,
        destination: &str,
        amount_uba: u128,
    ) -> Option<NonExistencePaymentProof> {
        let paid = self.transactions.iter().any(|tx| {
            tx.payment_reference == reference
                && tx.target_address == destination
                && tx.amount_uba >= amount_uba
        });
        if paid {
            return None;
        }
        Some(NonExistencePaymentProof {
            payment_reference: reference.to_string(),
            destination_address: destination.to_string(),
            amount_uba,
            first_block: 1,
            last_block: self.block_number,
            last_block_timestamp: self.block_timestamp,
        })
    }

    fn transaction_hash(
        &self,
        source: &str,
        target: &str,
        amount_uba: u128,
        fee_uba: u128,
        reference: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(target.as_bytes());
        hasher.update(amount_uba.to_be_bytes());
        hasher.update(fee_uba.to_be_bytes());
        hasher.update(reference.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(self.block_number.to_be_bytes());
        let result = hasher.finalize();
        format!("0x{:x}", result)
    }
}

//! Collateral pool share accounting
//!
//! The pool earns the pool share of every minting fee. Entitlement to those
//! fees follows pool tokens, with a twist: joining an earning pool would
//! grant a share of fees already accrued, so each holder carries an f-asset
//! fee debt for the virtual fees their tokens brought in unpaid. A holder's
//! spendable fees are their virtual share minus their debt.
//!
//! # Critical Invariants
//!
//! 1. For every holder, virtual fees >= fee debt (free fees never negative)
//! 2. Total virtual fees == pool-held fees + total fee debt
//! 3. Token transfers move only debt-free tokens, so debt stays covered
//!
//! CRITICAL: Token balances and fees are u128, fee debt is i128 (a negative
//! debt is a credit from exiting with fewer fees than entitled)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during pool share operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("holder {holder} has {available} pool tokens, needs {requested}")]
    InsufficientTokens {
        holder: String,
        requested: u128,
        available: u128,
    },

    #[error("pool holds {available} fees, payout of {requested} requested")]
    InsufficientFees { requested: u128, available: u128 },

    #[error("holder {holder} can transfer {transferable} tokens, {requested} requested (rest locked by fee debt)")]
    TokensLockedByDebt {
        holder: String,
        requested: u128,
        transferable: u128,
    },

    #[error("holder {holder} has {available} free fees, withdrawal of {requested} requested")]
    InsufficientFreeFees {
        holder: String,
        requested: u128,
        available: u128,
    },
}

/// Pool token balances, per-holder fee debt and the pool's f-asset fees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolShares {
    /// Pool tokens per holder; entries are pruned when balance and debt
    /// both reach zero
    token_balances: HashMap<String, u128>,

    /// F-asset fee debt per holder
    fee_debt: HashMap<String, i128>,

    /// F-asset fees currently held by the pool (UBA)
    total_fees_uba: u128,
}

impl PoolShares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(
        token_balances: HashMap<String, u128>,
        fee_debt: HashMap<String, i128>,
        total_fees_uba: u128,
    ) -> Self {
        Self {
            token_balances,
            fee_debt,
            total_fees_uba,
        }
    }

    pub fn balance_of(&self, holder: &str) -> u128 {
        self.token_balances.get(holder).copied().unwrap_or(0)
    }

    pub fn debt_of(&self, holder: &str) -> i128 {
        self.fee_debt.get(holder).copied().unwrap_or(0)
    }

    pub fn total_tokens(&self) -> u128 {
        self.token_balances.values().sum()
    }

    pub fn total_fee_debt(&self) -> i128 {
        self.fee_debt.values().sum()
    }

    pub fn total_fees_uba(&self) -> u128 {
        self.total_fees_uba
    }

    /// Fees the pool would hold had no holder deferred payment: held fees
    /// plus all outstanding debt.
    pub fn total_virtual_fees(&self) -> i128 {
        self.total_fees_uba as i128 + self.total_fee_debt()
    }

    /// Holders with a token balance or outstanding debt.
    pub fn holders(&self) -> impl Iterator<Item = &str> {
        self.token_balances
            .keys()
            .chain(self.fee_debt.keys())
            .map(String::as_str)
    }

    /// Holder's share of the total virtual fees, proportional to tokens.
    pub fn virtual_fees_of(&self, holder: &str) -> i128 {
        let total_tokens = self.total_tokens();
        if total_tokens == 0 {
            return 0;
        }
        self.total_virtual_fees() * self.balance_of(holder) as i128 / total_tokens as i128
    }

    /// Fees the holder may withdraw: virtual share minus debt.
    pub fn free_fees_of(&self, holder: &str) -> i128 {
        self.virtual_fees_of(holder) - self.debt_of(holder)
    }

    /// Tokens the holder may transfer away while still covering their debt.
    ///
    /// The locked amount rounds up so the tokens left behind always cover
    /// the debt.
    pub fn transferable_tokens_of(&self, holder: &str) -> u128 {
        let balance = self.balance_of(holder);
        let debt = self.debt_of(holder);
        let virtual_total = self.total_virtual_fees();
        if debt <= 0 || virtual_total <= 0 {
            return balance;
        }
        let locked =
            (debt * self.total_tokens() as i128 + virtual_total - 1) / virtual_total;
        balance.saturating_sub(locked as u128)
    }

    /// Credit the pool share of a minting fee.
    pub fn add_fees(&mut self, amount_uba: u128) {
        self.total_fees_uba += amount_uba;
    }

    /// Apply a pool entry: tokens minted to the holder, f-asset fees paid in
    /// to offset the fee debt the new tokens would otherwise carry.
    pub fn enter(&mut self, holder: &str, tokens: u128, paid_fees_uba: u128) {
        *self.token_balances.entry(holder.to_string()).or_insert(0) += tokens;
        self.total_fees_uba += paid_fees_uba;
        let change = self.fee_debt_change(tokens as i128, paid_fees_uba as i128);
        self.apply_debt_change(holder, change);
    }

    /// Apply a pool exit: tokens burned, the holder paid out fees.
    pub fn exit(
        &mut self,
        holder: &str,
        burned_tokens: u128,
        received_fees_uba: u128,
    ) -> Result<(), PoolError> {
        let balance = self.balance_of(holder);
        if burned_tokens > balance {
            return Err(PoolError::InsufficientTokens {
                holder: holder.to_string(),
                requested: burned_tokens,
                available: balance,
            });
        }
        if received_fees_uba > self.total_fees_uba {
            return Err(PoolError::InsufficientFees {
                requested: received_fees_uba,
                available: self.total_fees_uba,
            });
        }

        self.set_balance(holder, balance - burned_tokens);
        self.total_fees_uba -= received_fees_uba;
        let change = self.fee_debt_change(-(burned_tokens as i128), -(received_fees_uba as i128));
        self.apply_debt_change(holder, change);
        self.prune(holder);
        Ok(())
    }

    /// Move tokens between holders. Debt stays with the sender, so only
    /// debt-free tokens may move.
    pub fn transfer(&mut self, from: &str, to: &str, tokens: u128) -> Result<(), PoolError> {
        let transferable = self.transferable_tokens_of(from);
        if tokens > transferable {
            return Err(PoolError::TokensLockedByDebt {
                holder: from.to_string(),
                requested: tokens,
                transferable,
            });
        }
        let from_balance = self.balance_of(from);
        self.set_balance(from, from_balance - tokens);
        *self.token_balances.entry(to.to_string()).or_insert(0) += tokens;
        self.prune(from);
        Ok(())
    }

    /// Pay out part of a holder's free fees; the withdrawn amount becomes
    /// debt so their virtual share stays consistent.
    pub fn withdraw_fees(&mut self, holder: &str, amount_uba: u128) -> Result<(), PoolError> {
        let free = self.free_fees_of(holder);
        if (amount_uba as i128) > free {
            return Err(PoolError::InsufficientFreeFees {
                holder: holder.to_string(),
                requested: amount_uba,
                available: free.max(0) as u128,
            });
        }
        self.total_fees_uba -= amount_uba;
        self.apply_debt_change(holder, amount_uba as i128);
        Ok(())
    }

    /// Fee debt change for a holder whose entry or exit was already applied
    /// to the balances.
    ///
    /// The totals are un-applied first, then the holder is charged their
    /// proportional share of the pre-change virtual fees for the tokens
    /// received, minus the fees they paid in alongside. All four sign
    /// combinations reduce to this one formula.
    fn fee_debt_change(&self, received_tokens: i128, sent_fees: i128) -> i128 {
        let tokens_before = self.total_tokens() as i128 - received_tokens;
        let fees_before = self.total_fees_uba as i128 - sent_fees;
        let virtual_before = fees_before + self.total_fee_debt();
        let share = if virtual_before == 0 || tokens_before == 0 {
            0
        } else {
            virtual_before * received_tokens / tokens_before
        };
        share - sent_fees
    }

    fn apply_debt_change(&mut self, holder: &str, change: i128) {
        let debt = self.fee_debt.entry(holder.to_string()).or_insert(0);
        *debt += change;
        if *debt == 0 {
            self.fee_debt.remove(holder);
        }
    }

    fn set_balance(&mut self, holder: &str, balance: u128) {
        if balance == 0 {
            self.token_balances.remove(holder);
        } else {
            self.token_balances.insert(holder.to_string(), balance);
        }
    }

    fn prune(&mut self, holder: &str) {
        if self.balance_of(holder) == 0 && self.debt_of(holder) == 0 {
            self.token_balances.remove(holder);
            self.fee_debt.remove(holder);
        }
    }
}

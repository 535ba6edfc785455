//! Agent ledger model
//!
//! Per-agent accounting aggregate. Each agent ledger holds:
//! - Open collateral reservations (pending mintings)
//! - The redemption ticket book (minted backing plus dust)
//! - Active redemption requests
//! - The accounted underlying balance and withdrawal announcement
//! - Collateral pool shares and fee debt
//! - Collateral balances for both classes
//! - The agent status and liquidation timing
//!
//! Running totals (reserved, minted, redeeming) are maintained incrementally
//! by every operation and recomputed from the books in `check_invariants`;
//! a mismatch means an accounting bug, not bad input.
//!
//! CRITICAL: All UBA amounts are u128, underlying balances are i128

use crate::models::context::LedgerSettings;
use crate::models::pool::PoolShares;
use crate::models::redemption::{RedemptionError, RedemptionPaymentKind, RedemptionRequest};
use crate::models::reservation::CollateralReservation;
use crate::models::ticket::{CloseOutcome, MintOutcome, RedemptionTicket, TicketBook, TicketError};
use crate::models::underlying::{UnderlyingChangeKind, UnderlyingLedger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Agent lifecycle status.
///
/// Transitions only move toward more severe states, except that `Ccb` and
/// `Liquidation` return to `Normal` once both collateral ratios recover.
/// `FullLiquidation` is terminal until the agent backs nothing and winds
/// down through `Destroying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Healthy, all operations allowed
    Normal,
    /// Collateral call band: undercollateralized, grace period running
    Ccb,
    /// Liquidation: anyone may burn f-assets against the agent for a premium
    Liquidation,
    /// Full liquidation after proven misbehavior; cannot be stopped
    FullLiquidation,
    /// Wind-down announced; agent backs nothing anymore
    Destroying,
}

/// The two collateral classes an agent posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralClass {
    /// Vault collateral (stablecoin or similar)
    Class1,
    /// Collateral pool's native token holdings
    Pool,
}

/// Errors that can occur during agent ledger operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("invalid crt id {id}")]
    UnknownReservation { id: u64 },

    #[error("collateral reservation {id} already exists")]
    DuplicateReservation { id: u64 },

    #[error("invalid request id {id}")]
    UnknownRedemption { id: u64 },

    #[error("redemption request {id} already exists")]
    DuplicateRedemption { id: u64 },

    #[error("redemption closed {closed_uba} UBA for a request of {requested_uba} UBA")]
    RedemptionMismatch {
        requested_uba: u128,
        closed_uba: u128,
    },

    #[error("announced underlying withdrawal active")]
    WithdrawalAnnouncementActive,

    #[error("invalid announcement id {id}")]
    UnknownWithdrawalAnnouncement { id: u64 },

    #[error("not enough {collateral:?} collateral: requested {requested_wei}, available {available_wei}")]
    InsufficientCollateral {
        collateral: CollateralClass,
        requested_wei: u128,
        available_wei: u128,
    },

    #[error("agent still backing f-assets")]
    StillBackingFAssets,

    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error(transparent)]
    Redemption(#[from] RedemptionError),
}

/// Result of an executed minting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintingOutcome {
    /// The reservation consumed, None for self-mint
    pub reservation: Option<CollateralReservation>,
    /// Ticket and dust produced by the deposit
    pub mint: MintOutcome,
    /// Underlying deposit accounted for this minting
    pub deposited_uba: u128,
    /// Accounted underlying balance after the deposit
    pub balance_uba: i128,
}

/// Result of a confirmed redemption payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionPaymentOutcome {
    /// Redemption value (UBA)
    pub value_uba: u128,
    /// Collateral side released by this confirmation
    pub collateral_released: bool,
    /// Request fully released and removed
    pub removed: bool,
    /// Accounted underlying balance after the spend
    pub balance_uba: i128,
}

/// Per-agent accounting state.
///
/// # Example
/// ```
/// use fasset_ledger_core_rs::models::agent::AgentLedger;
/// use fasset_ledger_core_rs::models::context::LedgerSettings;
///
/// let settings = LedgerSettings::default();
/// let mut agent = AgentLedger::new(
///     "vault_1".to_string(),
///     "owner_1".to_string(),
///     "UNDERLYING_1".to_string(),
/// );
/// agent.deposit_collateral(
///     fasset_ledger_core_rs::models::agent::CollateralClass::Class1,
///     1_000_000,
/// );
/// assert_eq!(agent.minted_uba(), 0);
/// assert!(agent.check_invariants(&settings).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLedger {
    /// Vault address identifying the agent
    vault: String,

    /// Management address of the agent owner
    owner: String,

    /// Agent's address on the underlying chain
    underlying_address: String,

    status: AgentStatus,

    /// When the agent entered the collateral call band (0 = not in CCB)
    ccb_start_timestamp: u64,

    /// When liquidation started (0 = not liquidating)
    liquidation_start_timestamp: u64,

    /// Open collateral reservations by id
    reservations: BTreeMap<u64, CollateralReservation>,

    /// Minted backing: redemption tickets plus dust
    ticket_book: TicketBook,

    /// Active redemption requests by id
    redemptions: BTreeMap<u64, RedemptionRequest>,

    /// Accounted underlying balance changes
    underlying: UnderlyingLedger,

    /// Collateral pool token balances and fee debt
    pool: PoolShares,

    class1_collateral_wei: u128,
    pool_collateral_wei: u128,

    /// Active withdrawal announcement (0 = none)
    announced_withdrawal_id: u64,

    /// Dust last reported by the chain, compared against the book's dust
    reported_dust_uba: Option<u128>,

    // Running totals, cross-checked against the books in check_invariants
    total_reserved_uba: u128,
    total_minted_uba: u128,
    total_redeeming_uba: u128,
    total_pool_redeeming_uba: u128,
}

impl AgentLedger {
    pub fn new(vault: String, owner: String, underlying_address: String) -> Self {
        Self {
            vault,
            owner,
            underlying_address,
            status: AgentStatus::Normal,
            ccb_start_timestamp: 0,
            liquidation_start_timestamp: 0,
            reservations: BTreeMap::new(),
            ticket_book: TicketBook::new(),
            redemptions: BTreeMap::new(),
            underlying: UnderlyingLedger::new(),
            pool: PoolShares::new(),
            class1_collateral_wei: 0,
            pool_collateral_wei: 0,
            announced_withdrawal_id: 0,
            reported_dust_uba: None,
            total_reserved_uba: 0,
            total_minted_uba: 0,
            total_redeeming_uba: 0,
            total_pool_redeeming_uba: 0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn vault(&self) -> &str {
        &self.vault
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn underlying_address(&self) -> &str {
        &self.underlying_address
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn ccb_start_timestamp(&self) -> u64 {
        self.ccb_start_timestamp
    }

    pub fn liquidation_start_timestamp(&self) -> u64 {
        self.liquidation_start_timestamp
    }

    pub fn ticket_book(&self) -> &TicketBook {
        &self.ticket_book
    }

    pub fn pool(&self) -> &PoolShares {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut PoolShares {
        &mut self.pool
    }

    pub fn underlying(&self) -> &UnderlyingLedger {
        &self.underlying
    }

    pub fn reservation(&self, id: u64) -> Option<&CollateralReservation> {
        self.reservations.get(&id)
    }

    pub fn reservations(&self) -> impl Iterator<Item = &CollateralReservation> {
        self.reservations.values()
    }

    pub fn redemption(&self, id: u64) -> Option<&RedemptionRequest> {
        self.redemptions.get(&id)
    }

    pub fn redemptions(&self) -> impl Iterator<Item = &RedemptionRequest> {
        self.redemptions.values()
    }

    pub fn collateral_wei(&self, collateral: CollateralClass) -> u128 {
        match collateral {
            CollateralClass::Class1 => self.class1_collateral_wei,
            CollateralClass::Pool => self.pool_collateral_wei,
        }
    }

    pub fn announced_withdrawal_id(&self) -> u64 {
        self.announced_withdrawal_id
    }

    /// Backing reserved for pending mintings: value plus pool fee share.
    pub fn reserved_uba(&self) -> u128 {
        self.total_reserved_uba
    }

    /// Minted backing: tickets plus dust.
    pub fn minted_uba(&self) -> u128 {
        self.total_minted_uba
    }

    /// Backing still owed to redeemers (collateral side not yet released).
    pub fn redeeming_uba(&self) -> u128 {
        self.total_redeeming_uba
    }

    /// Like [`Self::redeeming_uba`] but excluding pool self-close
    /// redemptions, which never counted as pool backing.
    pub fn pool_redeeming_uba(&self) -> u128 {
        self.total_pool_redeeming_uba
    }

    pub fn dust_uba(&self) -> u128 {
        self.ticket_book.dust_uba()
    }

    /// Accounted underlying balance (sum of all recorded changes).
    pub fn underlying_balance_uba(&self) -> i128 {
        self.underlying.balance_uba()
    }

    /// Underlying not needed to back minted or redeeming f-assets. Negative
    /// means the agent spent backing it still owes, which is challengeable.
    pub fn free_underlying_balance_uba(&self) -> i128 {
        self.underlying.balance_uba()
            - self.total_minted_uba as i128
            - self.total_redeeming_uba as i128
    }

    /// Everything the agent currently backs, for collateral ratio and
    /// challenge reward purposes.
    pub fn backed_uba(&self) -> u128 {
        self.total_reserved_uba + self.total_minted_uba + self.total_redeeming_uba
    }

    /// Backing counted against the pool: self-close redemptions excluded.
    pub fn pool_backed_uba(&self) -> u128 {
        self.total_reserved_uba + self.total_minted_uba + self.total_pool_redeeming_uba
    }

    // ========================================================================
    // Collateral
    // ========================================================================

    pub fn deposit_collateral(&mut self, collateral: CollateralClass, amount_wei: u128) {
        match collateral {
            CollateralClass::Class1 => self.class1_collateral_wei += amount_wei,
            CollateralClass::Pool => self.pool_collateral_wei += amount_wei,
        }
    }

    pub fn withdraw_collateral(
        &mut self,
        collateral: CollateralClass,
        amount_wei: u128,
    ) -> Result<(), AgentError> {
        let balance = self.collateral_wei(collateral);
        if amount_wei > balance {
            return Err(AgentError::InsufficientCollateral {
                collateral,
                requested_wei: amount_wei,
                available_wei: balance,
            });
        }
        match collateral {
            CollateralClass::Class1 => self.class1_collateral_wei -= amount_wei,
            CollateralClass::Pool => self.pool_collateral_wei -= amount_wei,
        }
        Ok(())
    }

    /// Pay out collateral, clamped to what the agent holds. Returns the
    /// amount actually paid. Used for default payouts and rewards where the
    /// payment must go through even if collateral ran short.
    pub fn pay_out_collateral(&mut self, collateral: CollateralClass, amount_wei: u128) -> u128 {
        let balance = self.collateral_wei(collateral);
        let paid = amount_wei.min(balance);
        match collateral {
            CollateralClass::Class1 => self.class1_collateral_wei -= paid,
            CollateralClass::Pool => self.pool_collateral_wei -= paid,
        }
        paid
    }

    // ========================================================================
    // Minting
    // ========================================================================

    /// Open a collateral reservation.
    pub fn add_reservation(
        &mut self,
        reservation: CollateralReservation,
        settings: &LedgerSettings,
    ) -> Result<(), AgentError> {
        if self.reservations.contains_key(&reservation.id) {
            return Err(AgentError::DuplicateReservation { id: reservation.id });
        }
        self.total_reserved_uba += reservation.reserved_uba(settings);
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    /// Remove a reservation without minting (payment default or timeout).
    pub fn remove_reservation(
        &mut self,
        reservation_id: u64,
        settings: &LedgerSettings,
    ) -> Result<CollateralReservation, AgentError> {
        let reservation = self
            .reservations
            .remove(&reservation_id)
            .ok_or(AgentError::UnknownReservation { id: reservation_id })?;
        self.total_reserved_uba -= reservation.reserved_uba(settings);
        Ok(reservation)
    }

    /// Record an executed minting.
    ///
    /// The minter's deposit (minted value plus both fees) is accounted on
    /// the underlying ledger. The minted value plus the pool fee becomes
    /// backing on the ticket book, folding existing dust; the pool fee also
    /// accrues to the pool's f-asset fees. `reservation_id` zero is a
    /// self-mint, which consumes no reservation.
    pub fn execute_minting(
        &mut self,
        reservation_id: u64,
        ticket_id: u64,
        minted_uba: u128,
        agent_fee_uba: u128,
        pool_fee_uba: u128,
        settings: &LedgerSettings,
    ) -> Result<MintingOutcome, AgentError> {
        if reservation_id > 0 && !self.reservations.contains_key(&reservation_id) {
            return Err(AgentError::UnknownReservation { id: reservation_id });
        }

        // deposit_minted validates the ticket id, so it runs before any
        // mutation of the other books
        let mint =
            self.ticket_book
                .deposit_minted(ticket_id, minted_uba + pool_fee_uba, settings.lot_size_uba())?;

        let reservation = if reservation_id > 0 {
            Some(self.remove_reservation(reservation_id, settings)?)
        } else {
            None
        };

        let deposited_uba = minted_uba + agent_fee_uba + pool_fee_uba;
        self.underlying
            .record(UnderlyingChangeKind::Minting, deposited_uba as i128);
        self.total_minted_uba += minted_uba + pool_fee_uba;
        self.pool.add_fees(pool_fee_uba);

        Ok(MintingOutcome {
            reservation,
            mint,
            deposited_uba,
            balance_uba: self.underlying.balance_uba(),
        })
    }

    // ========================================================================
    // Redemption
    // ========================================================================

    /// Open a redemption request, closing whole lots from the ticket book.
    ///
    /// The request value must be exactly the lots closed; anything else
    /// means the caller and the book disagree about available backing.
    pub fn start_redemption(
        &mut self,
        request: RedemptionRequest,
        settings: &LedgerSettings,
    ) -> Result<CloseOutcome, AgentError> {
        if self.redemptions.contains_key(&request.id()) {
            return Err(AgentError::DuplicateRedemption { id: request.id() });
        }

        let value_uba = request.value_uba();
        let lot_size = settings.lot_size_uba();
        if value_uba % lot_size != 0 {
            // a sub-lot request would close less than its value
            return Err(AgentError::RedemptionMismatch {
                requested_uba: value_uba,
                closed_uba: value_uba - value_uba % lot_size,
            });
        }
        let outcome = self.ticket_book.close_whole_lots(value_uba, lot_size)?;

        self.total_minted_uba -= value_uba;
        self.total_redeeming_uba += value_uba;
        if !request.pool_self_close() {
            self.total_pool_redeeming_uba += value_uba;
        }
        self.redemptions.insert(request.id(), request);
        Ok(outcome)
    }

    /// Record the agent's confirmed redemption payment.
    ///
    /// The underlying side always releases and the spend is accounted. The
    /// collateral side releases for performed and blocked payments. The
    /// request is removed once both sides are released.
    pub fn confirm_redemption_payment(
        &mut self,
        request_id: u64,
        kind: RedemptionPaymentKind,
        spent_uba: u128,
    ) -> Result<RedemptionPaymentOutcome, AgentError> {
        let request = self
            .redemptions
            .get_mut(&request_id)
            .ok_or(AgentError::UnknownRedemption { id: request_id })?;

        let collateral_was_released = request.collateral_released();
        request.release_by_payment(kind)?;
        let collateral_released = !collateral_was_released && request.collateral_released();
        let value_uba = request.value_uba();
        let pool_self_close = request.pool_self_close();

        self.underlying
            .record(UnderlyingChangeKind::Redemption, -(spent_uba as i128));

        if collateral_released {
            self.total_redeeming_uba -= value_uba;
            if !pool_self_close {
                self.total_pool_redeeming_uba -= value_uba;
            }
        }

        let removed = self.remove_if_released(request_id);
        Ok(RedemptionPaymentOutcome {
            value_uba,
            collateral_released,
            removed,
            balance_uba: self.underlying.balance_uba(),
        })
    }

    /// Release the collateral side of a redemption after a default. Returns
    /// the request data for the payout and whether it was removed.
    pub fn default_redemption(
        &mut self,
        request_id: u64,
    ) -> Result<(RedemptionRequest, bool), AgentError> {
        let request = self
            .redemptions
            .get_mut(&request_id)
            .ok_or(AgentError::UnknownRedemption { id: request_id })?;

        request.release_collateral_by_default()?;
        let snapshot = request.clone();
        self.total_redeeming_uba -= snapshot.value_uba();
        if !snapshot.pool_self_close() {
            self.total_pool_redeeming_uba -= snapshot.value_uba();
        }
        let removed = self.remove_if_released(request_id);
        Ok((snapshot, removed))
    }

    fn remove_if_released(&mut self, request_id: u64) -> bool {
        let released = self
            .redemptions
            .get(&request_id)
            .map(|r| r.fully_released())
            .unwrap_or(false);
        if released {
            self.redemptions.remove(&request_id);
        }
        released
    }

    /// Close backing against the agent's own f-assets (any amount, dust
    /// first). Used for self-close and liquidation.
    pub fn close_backing(
        &mut self,
        amount_uba: u128,
        settings: &LedgerSettings,
    ) -> Result<CloseOutcome, AgentError> {
        let outcome = self
            .ticket_book
            .close_any_amount(amount_uba, settings.lot_size_uba())?;
        self.total_minted_uba -= amount_uba;
        Ok(outcome)
    }

    /// Fold lot-aligned dust back into a ticket. Minted backing is
    /// unchanged, it just moves from dust onto a ticket.
    pub fn convert_dust_to_ticket(
        &mut self,
        ticket_id: u64,
        settings: &LedgerSettings,
    ) -> Result<RedemptionTicket, AgentError> {
        let ticket = self
            .ticket_book
            .convert_dust(ticket_id, settings.lot_size_uba())?;
        Ok(ticket)
    }

    // ========================================================================
    // Underlying
    // ========================================================================

    /// Account a confirmed top-up of the agent's underlying address.
    pub fn topup_underlying(&mut self, amount_uba: u128) -> i128 {
        self.underlying
            .record(UnderlyingChangeKind::Topup, amount_uba as i128);
        self.underlying.balance_uba()
    }

    /// Announce an underlying withdrawal. Only one may be active.
    pub fn announce_withdrawal(&mut self, announcement_id: u64) -> Result<(), AgentError> {
        if self.announced_withdrawal_id != 0 {
            return Err(AgentError::WithdrawalAnnouncementActive);
        }
        self.announced_withdrawal_id = announcement_id;
        Ok(())
    }

    /// Account the confirmed withdrawal payment and close the announcement.
    pub fn confirm_withdrawal(
        &mut self,
        announcement_id: u64,
        spent_uba: u128,
    ) -> Result<i128, AgentError> {
        self.close_announcement(announcement_id)?;
        self.underlying
            .record(UnderlyingChangeKind::Withdrawal, -(spent_uba as i128));
        Ok(self.underlying.balance_uba())
    }

    /// Cancel an announced withdrawal without a payment.
    pub fn cancel_withdrawal(&mut self, announcement_id: u64) -> Result<(), AgentError> {
        self.close_announcement(announcement_id)
    }

    fn close_announcement(&mut self, announcement_id: u64) -> Result<(), AgentError> {
        if self.announced_withdrawal_id == 0 || self.announced_withdrawal_id != announcement_id {
            return Err(AgentError::UnknownWithdrawalAnnouncement {
                id: announcement_id,
            });
        }
        self.announced_withdrawal_id = 0;
        Ok(())
    }

    /// Record the dust value the chain reported, for cross-checking.
    pub fn report_dust(&mut self, dust_uba: u128) {
        self.reported_dust_uba = Some(dust_uba);
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Enter the collateral call band.
    pub fn enter_ccb(&mut self, now: u64) {
        self.status = AgentStatus::Ccb;
        self.ccb_start_timestamp = now;
    }

    /// Start liquidation. When upgrading from an expired CCB, liquidation is
    /// backdated to the moment the band expired.
    pub fn start_liquidation(&mut self, now: u64, settings: &LedgerSettings) {
        let ccb_expiry = self.ccb_start_timestamp + settings.ccb_time_seconds;
        let start = if self.status == AgentStatus::Ccb
            && self.ccb_start_timestamp > 0
            && now >= ccb_expiry
        {
            ccb_expiry
        } else {
            now
        };
        self.status = AgentStatus::Liquidation;
        self.liquidation_start_timestamp = start;
        self.ccb_start_timestamp = 0;
    }

    /// Move to full liquidation (challenge confirmed). An already running
    /// liquidation keeps its start time.
    pub fn start_full_liquidation(&mut self, now: u64) {
        if self.liquidation_start_timestamp == 0 {
            self.liquidation_start_timestamp = now;
        }
        self.status = AgentStatus::FullLiquidation;
        self.ccb_start_timestamp = 0;
    }

    /// Leave CCB or liquidation once both collateral ratios are safe again.
    pub fn return_to_normal(&mut self) {
        self.status = AgentStatus::Normal;
        self.ccb_start_timestamp = 0;
        self.liquidation_start_timestamp = 0;
    }

    /// Announce wind-down. The agent must back nothing.
    pub fn announce_destroy(&mut self) -> Result<(), AgentError> {
        if self.total_minted_uba > 0
            || self.total_reserved_uba > 0
            || self.total_redeeming_uba > 0
        {
            return Err(AgentError::StillBackingFAssets);
        }
        self.status = AgentStatus::Destroying;
        Ok(())
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Cross-check running totals against the books. Returns one line per
    /// violation; an empty result means the ledger is consistent.
    pub fn check_invariants(&self, settings: &LedgerSettings) -> Vec<String> {
        let mut violations = Vec::new();

        let derived_reserved: u128 = self
            .reservations
            .values()
            .map(|r| r.reserved_uba(settings))
            .sum();
        if derived_reserved != self.total_reserved_uba {
            violations.push(format!(
                "agent {}: reserved total {} != sum over reservations {}",
                self.vault, self.total_reserved_uba, derived_reserved
            ));
        }

        let derived_minted = self.ticket_book.total_uba();
        if derived_minted != self.total_minted_uba {
            violations.push(format!(
                "agent {}: minted total {} != ticket book {}",
                self.vault, self.total_minted_uba, derived_minted
            ));
        }

        let derived_redeeming: u128 = self
            .redemptions
            .values()
            .filter(|r| !r.collateral_released())
            .map(|r| r.value_uba())
            .sum();
        if derived_redeeming != self.total_redeeming_uba {
            violations.push(format!(
                "agent {}: redeeming total {} != sum over requests {}",
                self.vault, self.total_redeeming_uba, derived_redeeming
            ));
        }

        let derived_pool_redeeming: u128 = self
            .redemptions
            .values()
            .filter(|r| !r.collateral_released() && !r.pool_self_close())
            .map(|r| r.value_uba())
            .sum();
        if derived_pool_redeeming != self.total_pool_redeeming_uba {
            violations.push(format!(
                "agent {}: pool redeeming total {} != sum over requests {}",
                self.vault, self.total_pool_redeeming_uba, derived_pool_redeeming
            ));
        }

        if let Some(reported) = self.reported_dust_uba {
            if reported != self.ticket_book.dust_uba() {
                violations.push(format!(
                    "agent {}: reported dust {} != calculated dust {}",
                    self.vault,
                    reported,
                    self.ticket_book.dust_uba()
                ));
            }
        }

        if self.status != AgentStatus::FullLiquidation && self.free_underlying_balance_uba() < 0 {
            violations.push(format!(
                "agent {}: free underlying balance {} is negative",
                self.vault,
                self.free_underlying_balance_uba()
            ));
        }

        for holder in self.pool.holders() {
            let virtual_fees = self.pool.virtual_fees_of(holder);
            let debt = self.pool.debt_of(holder);
            if virtual_fees < debt {
                violations.push(format!(
                    "agent {}: pool holder {} has virtual fees {} below debt {}",
                    self.vault, holder, virtual_fees, debt
                ));
            }
        }

        if self.status == AgentStatus::Destroying && self.backed_uba() > 0 {
            violations.push(format!(
                "agent {}: destroying while still backing {} UBA",
                self.vault,
                self.backed_uba()
            ));
        }

        violations
    }

    /// Audit the accounted backing against the real balance of the agent's
    /// underlying address, as observed by the caller.
    ///
    /// An agent in full liquidation is already past enforcement, so it is
    /// exempt.
    pub fn check_underlying_backing(&self, chain_balance_uba: u128) -> Vec<String> {
        if self.status == AgentStatus::FullLiquidation {
            return Vec::new();
        }
        let required = self.total_minted_uba as i128 + self.free_underlying_balance_uba();
        if (chain_balance_uba as i128) < required {
            return vec![format!(
                "agent {}: underlying balance {} below required backing {}",
                self.vault, chain_balance_uba, required
            )];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference;

    const LOT: u128 = 10_000;

    fn settings() -> LedgerSettings {
        LedgerSettings::default()
    }

    fn agent() -> AgentLedger {
        AgentLedger::new(
            "vault_1".to_string(),
            "owner_1".to_string(),
            "UNDERLYING_1".to_string(),
        )
    }

    fn reservation(id: u64, value_uba: u128, fee_uba: u128) -> CollateralReservation {
        CollateralReservation {
            id,
            minter: "minter_1".to_string(),
            value_uba,
            fee_uba,
            first_underlying_block: 1,
            last_underlying_block: 100,
            last_underlying_timestamp: 10_000,
            payment_reference: reference::minting(id),
        }
    }

    fn redemption_request(id: u64, value_uba: u128) -> RedemptionRequest {
        RedemptionRequest::new(
            id,
            "redeemer_1".to_string(),
            value_uba,
            value_uba / 100,
            1,
            100,
            10_000,
            "UNDERLYING_REDEEMER".to_string(),
            reference::redemption(id),
            false,
        )
    }

    #[test]
    fn test_minting_moves_reservation_to_tickets() {
        let s = settings();
        let mut a = agent();
        a.add_reservation(reservation(1, 30_000, 1_000), &s).unwrap();
        assert_eq!(a.reserved_uba(), 30_400); // value + 40% of fee

        let outcome = a.execute_minting(1, 1, 30_000, 600, 400, &s).unwrap();
        assert_eq!(a.reserved_uba(), 0);
        assert_eq!(a.minted_uba(), 30_400);
        assert_eq!(outcome.deposited_uba, 31_000);
        // agent fee is the only free underlying
        assert_eq!(a.free_underlying_balance_uba(), 600);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_self_mint_needs_no_reservation() {
        let s = settings();
        let mut a = agent();
        let outcome = a.execute_minting(0, 1, 20_000, 0, 0, &s).unwrap();
        assert!(outcome.reservation.is_none());
        assert_eq!(a.minted_uba(), 20_000);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_minting_unknown_reservation_rejected() {
        let s = settings();
        let mut a = agent();
        let err = a.execute_minting(7, 1, 20_000, 0, 0, &s).unwrap_err();
        assert_eq!(err, AgentError::UnknownReservation { id: 7 });
    }

    #[test]
    fn test_redemption_lifecycle_performed_payment() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 30_000, 0, 0, &s).unwrap();

        a.start_redemption(redemption_request(5, 20_000), &s).unwrap();
        assert_eq!(a.minted_uba(), 10_000);
        assert_eq!(a.redeeming_uba(), 20_000);
        assert!(a.check_invariants(&s).is_empty());

        let outcome = a
            .confirm_redemption_payment(5, RedemptionPaymentKind::Performed, 19_800)
            .unwrap();
        assert!(outcome.removed);
        assert_eq!(a.redeeming_uba(), 0);
        // deposit 30_000, spent 19_800, minted 10_000 -> free 200
        assert_eq!(a.free_underlying_balance_uba(), 200);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_failed_payment_keeps_redeeming_until_default() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 30_000, 0, 0, &s).unwrap();
        a.start_redemption(redemption_request(5, 20_000), &s).unwrap();

        let outcome = a
            .confirm_redemption_payment(5, RedemptionPaymentKind::Failed, 100)
            .unwrap();
        assert!(!outcome.removed);
        assert!(!outcome.collateral_released);
        assert_eq!(a.redeeming_uba(), 20_000);

        let (_, removed) = a.default_redemption(5).unwrap();
        assert!(removed);
        assert_eq!(a.redeeming_uba(), 0);
    }

    #[test]
    fn test_double_default_is_invalid_status() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 30_000, 0, 0, &s).unwrap();
        a.start_redemption(redemption_request(5, 20_000), &s).unwrap();

        let (_, removed) = a.default_redemption(5).unwrap();
        assert!(!removed); // underlying side still open
        let err = a.default_redemption(5).unwrap_err();
        assert_eq!(err, AgentError::Redemption(RedemptionError::InvalidStatus));
    }

    #[test]
    fn test_pool_self_close_excluded_from_pool_redeeming() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 40_000, 0, 0, &s).unwrap();

        let mut req = redemption_request(5, 20_000);
        req = RedemptionRequest::new(
            req.id(),
            req.redeemer().to_string(),
            req.value_uba(),
            req.fee_uba(),
            req.first_underlying_block(),
            req.last_underlying_block(),
            req.last_underlying_timestamp(),
            req.payment_address().to_string(),
            req.payment_reference().to_string(),
            true, // pool self-close
        );
        a.start_redemption(req, &s).unwrap();

        assert_eq!(a.redeeming_uba(), 20_000);
        assert_eq!(a.pool_redeeming_uba(), 0);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_self_close_consumes_dust_first() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 25_500, 0, 0, &s).unwrap();
        assert_eq!(a.dust_uba(), 5_500);

        a.close_backing(5_000, &s).unwrap();
        assert_eq!(a.dust_uba(), 500);
        assert_eq!(a.minted_uba(), 20_500);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_convert_dust_to_ticket() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 30_000, 0, 0, &s).unwrap();
        a.close_backing(12_500, &s).unwrap(); // ticket 1 left at 17_500
        a.execute_minting(0, 2, 25_500, 0, 0, &s).unwrap(); // dust 5_500

        // redeeming one lot exhausts ticket 1 and folds its 7_500 tail
        a.start_redemption(redemption_request(5, 10_000), &s).unwrap();
        assert_eq!(a.dust_uba(), 13_000);

        let ticket = a.convert_dust_to_ticket(9, &s).unwrap();
        assert_eq!(ticket.value_uba, 10_000);
        assert_eq!(a.dust_uba(), 3_000);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_withdrawal_announcement_lifecycle() {
        let mut a = agent();
        a.topup_underlying(1_000);

        a.announce_withdrawal(1).unwrap();
        assert_eq!(
            a.announce_withdrawal(2).unwrap_err(),
            AgentError::WithdrawalAnnouncementActive
        );

        let balance = a.confirm_withdrawal(1, 400).unwrap();
        assert_eq!(balance, 600);
        assert_eq!(a.announced_withdrawal_id(), 0);

        // announcement gone, confirm again fails
        assert_eq!(
            a.confirm_withdrawal(1, 400).unwrap_err(),
            AgentError::UnknownWithdrawalAnnouncement { id: 1 }
        );
    }

    #[test]
    fn test_negative_free_balance_is_violation_unless_full_liquidation() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 20_000, 0, 0, &s).unwrap();
        a.announce_withdrawal(1).unwrap();
        a.confirm_withdrawal(1, 500).unwrap(); // spends backing it owes

        assert_eq!(a.free_underlying_balance_uba(), -500);
        assert_eq!(a.check_invariants(&s).len(), 1);

        a.start_full_liquidation(1_000);
        assert!(a.check_invariants(&s).is_empty());
    }

    #[test]
    fn test_reported_dust_mismatch_is_violation() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 25_500, 0, 0, &s).unwrap();

        a.report_dust(5_500);
        assert!(a.check_invariants(&s).is_empty());

        a.report_dust(9_999);
        assert_eq!(a.check_invariants(&s).len(), 1);
    }

    #[test]
    fn test_liquidation_backdates_to_ccb_expiry() {
        let s = settings();
        let mut a = agent();
        a.enter_ccb(1_000);
        assert_eq!(a.status(), AgentStatus::Ccb);

        // ccb_time is 180s; upgrade happens late at t=1_500
        a.start_liquidation(1_500, &s);
        assert_eq!(a.status(), AgentStatus::Liquidation);
        assert_eq!(a.liquidation_start_timestamp(), 1_180);
        assert_eq!(a.ccb_start_timestamp(), 0);
    }

    #[test]
    fn test_full_liquidation_keeps_running_start() {
        let s = settings();
        let mut a = agent();
        a.start_liquidation(1_000, &s);
        a.start_full_liquidation(2_000);
        assert_eq!(a.status(), AgentStatus::FullLiquidation);
        assert_eq!(a.liquidation_start_timestamp(), 1_000);
    }

    #[test]
    fn test_destroy_requires_no_backing() {
        let s = settings();
        let mut a = agent();
        a.execute_minting(0, 1, 20_000, 0, 0, &s).unwrap();
        assert_eq!(
            a.announce_destroy().unwrap_err(),
            AgentError::StillBackingFAssets
        );

        a.close_backing(20_000, &s).unwrap();
        a.announce_destroy().unwrap();
        assert_eq!(a.status(), AgentStatus::Destroying);
    }

    #[test]
    fn test_pay_out_collateral_clamps() {
        let mut a = agent();
        a.deposit_collateral(CollateralClass::Class1, 1_000);
        let paid = a.pay_out_collateral(CollateralClass::Class1, 1_500);
        assert_eq!(paid, 1_000);
        assert_eq!(a.collateral_wei(CollateralClass::Class1), 0);
    }
}

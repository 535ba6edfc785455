//! Redemption ticket book
//!
//! Minted backing is organized as a FIFO book of redemption tickets plus a
//! sub-lot dust remainder. Tickets are closed in ascending id order, whole
//! lots at a time for redemptions or by arbitrary amounts for self-close.
//! Whenever a close leaves a ticket holding less than one lot, the remainder
//! folds into dust and the ticket is deleted.
//!
//! # Critical Invariants
//!
//! 1. Every stored ticket holds at least one lot
//! 2. `dust_uba` is always strictly below one lot after a deposit
//! 3. Minted backing equals the sum of all tickets plus dust
//!
//! CRITICAL: All amounts are u128 UBA

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while closing tickets
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("not enough whole lots on tickets: requested {requested_lots}, available {available_lots}")]
    NotEnoughLots {
        requested_lots: u128,
        available_lots: u128,
    },

    #[error("not enough backing to close: requested {requested_uba}, available {available_uba}")]
    NotEnoughBacking {
        requested_uba: u128,
        available_uba: u128,
    },

    #[error("redemption ticket {id} already exists")]
    DuplicateTicket { id: u64 },

    #[error("dust {dust_uba} is below one lot, nothing to convert")]
    DustBelowLot { dust_uba: u128 },
}

/// A single redemption ticket: minted backing waiting to be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionTicket {
    pub id: u64,
    pub value_uba: u128,
}

/// One structural change to the book, reported so callers can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketChange {
    Created { id: u64, value_uba: u128 },
    Shrunk { id: u64, value_uba: u128 },
    Deleted { id: u64 },
}

/// Result of a deposit: the ticket created (if any) and the new dust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOutcome {
    pub ticket: Option<RedemptionTicket>,
    pub dust_uba: u128,
}

/// Result of a close: the amount actually closed and the book changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub closed_uba: u128,
    pub changes: Vec<TicketChange>,
}

/// FIFO book of redemption tickets plus the dust remainder.
///
/// # Example
/// ```
/// use fasset_ledger_core_rs::models::ticket::TicketBook;
///
/// let mut book = TicketBook::new();
/// let out = book.deposit_minted(1, 25_500, 10_000).unwrap();
/// assert_eq!(out.ticket.unwrap().value_uba, 20_000);
/// assert_eq!(out.dust_uba, 5_500);
/// assert_eq!(book.total_uba(), 25_500);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBook {
    /// Tickets by id; BTreeMap keeps FIFO (ascending id) iteration order
    tickets: BTreeMap<u64, u128>,

    /// Sub-lot remainder not on any ticket
    dust_uba: u128,
}

impl TicketBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a book from checkpoint data.
    pub fn from_snapshot(tickets: BTreeMap<u64, u128>, dust_uba: u128) -> Self {
        Self { tickets, dust_uba }
    }

    /// Iterate tickets in ascending id order.
    pub fn tickets(&self) -> impl Iterator<Item = RedemptionTicket> + '_ {
        self.tickets
            .iter()
            .map(|(&id, &value_uba)| RedemptionTicket { id, value_uba })
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    pub fn ticket_value(&self, id: u64) -> Option<u128> {
        self.tickets.get(&id).copied()
    }

    pub fn dust_uba(&self) -> u128 {
        self.dust_uba
    }

    /// Total minted backing: all tickets plus dust.
    pub fn total_uba(&self) -> u128 {
        self.tickets.values().sum::<u128>() + self.dust_uba
    }

    /// Whole lots closable from tickets (dust never contributes lots).
    pub fn available_lots(&self, lot_size_uba: u128) -> u128 {
        self.tickets.values().map(|v| v / lot_size_uba).sum()
    }

    /// Record newly minted backing.
    ///
    /// The existing dust folds into the deposit: the combined amount is split
    /// into a lot-aligned ticket and a new sub-lot dust remainder. No ticket
    /// is created when the combined amount is below one lot.
    ///
    /// # Arguments
    /// * `ticket_id` - id assigned by the asset manager for the new ticket
    /// * `amount_uba` - minted value plus pool fee (everything that becomes backing)
    /// * `lot_size_uba` - current lot size
    pub fn deposit_minted(
        &mut self,
        ticket_id: u64,
        amount_uba: u128,
        lot_size_uba: u128,
    ) -> Result<MintOutcome, TicketError> {
        if self.tickets.contains_key(&ticket_id) {
            return Err(TicketError::DuplicateTicket { id: ticket_id });
        }

        let amount_with_dust = self.dust_uba + amount_uba;
        let new_dust = amount_with_dust % lot_size_uba;
        let ticket_value = amount_with_dust - new_dust;

        self.dust_uba = new_dust;

        let ticket = if ticket_value > 0 {
            self.tickets.insert(ticket_id, ticket_value);
            Some(RedemptionTicket {
                id: ticket_id,
                value_uba: ticket_value,
            })
        } else {
            None
        };

        Ok(MintOutcome {
            ticket,
            dust_uba: new_dust,
        })
    }

    /// Close whole lots from the book in FIFO order (redemption path).
    ///
    /// `amount_uba` is taken as a whole number of lots (any sub-lot part is
    /// ignored). When a ticket is left holding less than one lot, the
    /// remainder folds into dust and the ticket is deleted.
    ///
    /// Fails without modifying the book when the tickets do not hold enough
    /// whole lots.
    pub fn close_whole_lots(
        &mut self,
        amount_uba: u128,
        lot_size_uba: u128,
    ) -> Result<CloseOutcome, TicketError> {
        let requested_lots = amount_uba / lot_size_uba;
        let available_lots = self.available_lots(lot_size_uba);
        if requested_lots > available_lots {
            return Err(TicketError::NotEnoughLots {
                requested_lots,
                available_lots,
            });
        }

        let mut remaining_lots = requested_lots;
        let mut changes = Vec::new();

        let ids: Vec<u64> = self.tickets.keys().copied().collect();
        for id in ids {
            if remaining_lots == 0 {
                break;
            }
            let value = self.tickets[&id];
            let ticket_lots = value / lot_size_uba;
            let redeem_lots = remaining_lots.min(ticket_lots);
            if redeem_lots == 0 {
                continue;
            }
            let new_value = value - redeem_lots * lot_size_uba;
            if new_value < lot_size_uba {
                // ticket exhausted of whole lots, tail folds into dust
                self.dust_uba += new_value;
                self.tickets.remove(&id);
                changes.push(TicketChange::Deleted { id });
            } else {
                self.tickets.insert(id, new_value);
                changes.push(TicketChange::Shrunk {
                    id,
                    value_uba: new_value,
                });
            }
            remaining_lots -= redeem_lots;
        }

        Ok(CloseOutcome {
            closed_uba: requested_lots * lot_size_uba,
            changes,
        })
    }

    /// Move the lot-aligned part of the dust onto a fresh ticket.
    ///
    /// Dust normally stays below one lot, but a whole-lot close can fold a
    /// sub-lot ticket tail on top of existing dust and push it over. This
    /// restores the dust to its sub-lot remainder.
    pub fn convert_dust(
        &mut self,
        ticket_id: u64,
        lot_size_uba: u128,
    ) -> Result<RedemptionTicket, TicketError> {
        if self.tickets.contains_key(&ticket_id) {
            return Err(TicketError::DuplicateTicket { id: ticket_id });
        }
        let lot_aligned = self.dust_uba - self.dust_uba % lot_size_uba;
        if lot_aligned == 0 {
            return Err(TicketError::DustBelowLot {
                dust_uba: self.dust_uba,
            });
        }
        self.dust_uba -= lot_aligned;
        self.tickets.insert(ticket_id, lot_aligned);
        Ok(RedemptionTicket {
            id: ticket_id,
            value_uba: lot_aligned,
        })
    }

    /// Close an exact amount from dust first, then tickets in FIFO order
    /// (self-close and liquidation path).
    ///
    /// Fails without modifying the book when dust plus tickets cannot cover
    /// the amount.
    pub fn close_any_amount(
        &mut self,
        amount_uba: u128,
        lot_size_uba: u128,
    ) -> Result<CloseOutcome, TicketError> {
        let available_uba = self.total_uba();
        if amount_uba > available_uba {
            return Err(TicketError::NotEnoughBacking {
                requested_uba: amount_uba,
                available_uba,
            });
        }

        let mut remaining = amount_uba;
        let mut changes = Vec::new();

        let from_dust = self.dust_uba.min(remaining);
        self.dust_uba -= from_dust;
        remaining -= from_dust;

        let ids: Vec<u64> = self.tickets.keys().copied().collect();
        for id in ids {
            if remaining == 0 {
                break;
            }
            let value = self.tickets[&id];
            let take = remaining.min(value);
            let new_value = value - take;
            if new_value < lot_size_uba {
                self.dust_uba += new_value;
                self.tickets.remove(&id);
                changes.push(TicketChange::Deleted { id });
            } else {
                self.tickets.insert(id, new_value);
                changes.push(TicketChange::Shrunk {
                    id,
                    value_uba: new_value,
                });
            }
            remaining -= take;
        }

        Ok(CloseOutcome {
            closed_uba: amount_uba,
            changes,
        })
    }
}

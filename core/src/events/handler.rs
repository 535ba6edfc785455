//! Chain event application
//!
//! This module routes each [`ChainEvent`] to the agent ledger mutations it
//! implies and logs the derived facts. Application is validate-then-commit:
//! an event that fails leaves no partial state behind.

use thiserror::Error;

use crate::events::types::ChainEvent;
use crate::models::{
    AgentError, AgentLedger, AgentStatus, CollateralClass, CollateralReservation, FactLog,
    LedgerContext, LedgerFact, LedgerState, PoolError, RedemptionPaymentKind, RedemptionRequest,
    StateError, TicketChange, UnderlyingChangeKind,
};

/// Errors from applying a chain event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("self close of 0")]
    SelfCloseOfZero,

    #[error("invalid agent status")]
    InvalidAgentStatus,

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ChainEvent {
    /// Apply this event to the ledger, logging the derived facts.
    ///
    /// `now` is the ledger timestamp the facts are stamped with.
    pub fn apply(
        &self,
        state: &mut LedgerState,
        context: &LedgerContext,
        log: &mut FactLog,
        now: u64,
    ) -> Result<(), EventError> {
        match self {
            ChainEvent::AgentCreated {
                agent_vault,
                owner,
                underlying_address,
            } => apply_agent_created(state, log, now, agent_vault, owner, underlying_address),

            ChainEvent::CollateralReserved {
                agent_vault,
                reservation_id,
                minter,
                value_uba,
                fee_uba,
                first_underlying_block,
                last_underlying_block,
                last_underlying_timestamp,
                payment_reference,
            } => apply_collateral_reserved(
                state,
                context,
                log,
                now,
                agent_vault,
                CollateralReservation {
                    id: *reservation_id,
                    minter: minter.clone(),
                    value_uba: *value_uba,
                    fee_uba: *fee_uba,
                    first_underlying_block: *first_underlying_block,
                    last_underlying_block: *last_underlying_block,
                    last_underlying_timestamp: *last_underlying_timestamp,
                    payment_reference: payment_reference.clone(),
                },
            ),

            ChainEvent::MintingExecuted {
                agent_vault,
                reservation_id,
                redemption_ticket_id,
                minted_uba,
                agent_fee_uba,
                pool_fee_uba,
            } => apply_minting_executed(
                state,
                context,
                log,
                now,
                agent_vault,
                *reservation_id,
                *redemption_ticket_id,
                *minted_uba,
                *agent_fee_uba,
                *pool_fee_uba,
            ),

            ChainEvent::MintingPaymentDefault {
                agent_vault,
                reservation_id,
            } => apply_minting_payment_default(state, context, log, now, agent_vault, *reservation_id),

            ChainEvent::SelfClose {
                agent_vault,
                value_uba,
            } => apply_self_close(state, context, log, now, agent_vault, *value_uba),

            ChainEvent::RedemptionRequested {
                agent_vault,
                request_id,
                redeemer,
                value_uba,
                fee_uba,
                first_underlying_block,
                last_underlying_block,
                last_underlying_timestamp,
                payment_address,
                payment_reference,
                pool_self_close,
            } => apply_redemption_requested(
                state,
                context,
                log,
                now,
                agent_vault,
                RedemptionRequest::new(
                    *request_id,
                    redeemer.clone(),
                    *value_uba,
                    *fee_uba,
                    *first_underlying_block,
                    *last_underlying_block,
                    *last_underlying_timestamp,
                    payment_address.clone(),
                    payment_reference.clone(),
                    *pool_self_close,
                ),
            ),

            ChainEvent::RedemptionPaymentConfirmed {
                agent_vault,
                request_id,
                kind,
                spent_uba,
            } => apply_redemption_payment(state, log, now, agent_vault, *request_id, *kind, *spent_uba),

            ChainEvent::UnderlyingWithdrawalAnnounced {
                agent_vault,
                announcement_id,
            } => apply_withdrawal_announced(state, log, now, agent_vault, *announcement_id),

            ChainEvent::UnderlyingWithdrawalConfirmed {
                agent_vault,
                announcement_id,
                spent_uba,
            } => apply_withdrawal_confirmed(state, log, now, agent_vault, *announcement_id, *spent_uba),

            ChainEvent::UnderlyingWithdrawalCancelled {
                agent_vault,
                announcement_id,
            } => apply_withdrawal_cancelled(state, log, now, agent_vault, *announcement_id),

            ChainEvent::UnderlyingTopup {
                agent_vault,
                amount_uba,
            } => apply_topup(state, log, now, agent_vault, *amount_uba),

            ChainEvent::PoolEnter {
                agent_vault,
                holder,
                tokens,
                paid_fees_uba,
            } => {
                let agent = state.agent_mut(agent_vault)?;
                agent.pool_mut().enter(holder, *tokens, *paid_fees_uba);
                log_pool_position(log, now, agent, holder);
                Ok(())
            }

            ChainEvent::PoolExit {
                agent_vault,
                holder,
                burned_tokens,
                received_fees_uba,
            } => {
                let agent = state.agent_mut(agent_vault)?;
                agent
                    .pool_mut()
                    .exit(holder, *burned_tokens, *received_fees_uba)?;
                log_pool_position(log, now, agent, holder);
                Ok(())
            }

            ChainEvent::PoolTokenTransfer {
                agent_vault,
                from,
                to,
                tokens,
            } => {
                let agent = state.agent_mut(agent_vault)?;
                agent.pool_mut().transfer(from, to, *tokens)?;
                log_pool_position(log, now, agent, from);
                log_pool_position(log, now, agent, to);
                Ok(())
            }

            ChainEvent::PoolFeesWithdrawn {
                agent_vault,
                holder,
                amount_uba,
            } => {
                let agent = state.agent_mut(agent_vault)?;
                agent.pool_mut().withdraw_fees(holder, *amount_uba)?;
                log_pool_position(log, now, agent, holder);
                Ok(())
            }

            ChainEvent::CollateralDeposited {
                agent_vault,
                collateral,
                amount_wei,
            } => {
                let agent = state.agent_mut(agent_vault)?;
                agent.deposit_collateral(*collateral, *amount_wei);
                log_collateral(log, now, agent, *collateral);
                Ok(())
            }

            ChainEvent::CollateralWithdrawn {
                agent_vault,
                collateral,
                amount_wei,
            } => {
                let agent = state.agent_mut(agent_vault)?;
                // withdrawal is an owner privilege of healthy agents only
                if agent.status() != AgentStatus::Normal {
                    return Err(EventError::InvalidAgentStatus);
                }
                agent.withdraw_collateral(*collateral, *amount_wei)?;
                log_collateral(log, now, agent, *collateral);
                Ok(())
            }

            ChainEvent::DustChanged {
                agent_vault,
                dust_uba,
            } => {
                // reported value, kept for cross-checking against the book
                state.agent_mut(agent_vault)?.report_dust(*dust_uba);
                Ok(())
            }

            ChainEvent::DustConvertedToTicket {
                agent_vault,
                ticket_id,
            } => apply_dust_converted(state, context, log, now, agent_vault, *ticket_id),

            ChainEvent::AgentDestroyed { agent_vault } => {
                if state.agent(agent_vault)?.status() != AgentStatus::Destroying {
                    return Err(EventError::InvalidAgentStatus);
                }
                state.remove_agent(agent_vault)?;
                log.log(LedgerFact::AgentDestroyed {
                    timestamp: now,
                    agent_vault: agent_vault.clone(),
                });
                Ok(())
            }
        }
    }
}

// ============================================================================
// Application functions
// ============================================================================

fn apply_agent_created(
    state: &mut LedgerState,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    owner: &str,
    underlying_address: &str,
) -> Result<(), EventError> {
    state.register_agent(AgentLedger::new(
        agent_vault.to_string(),
        owner.to_string(),
        underlying_address.to_string(),
    ))?;
    log.log(LedgerFact::AgentRegistered {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        underlying_address: underlying_address.to_string(),
    });
    Ok(())
}

fn apply_collateral_reserved(
    state: &mut LedgerState,
    context: &LedgerContext,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    reservation: CollateralReservation,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    let (reservation_id, value_uba, fee_uba) =
        (reservation.id, reservation.value_uba, reservation.fee_uba);
    agent.add_reservation(reservation, &context.settings)?;
    log.log(LedgerFact::ReservationCreated {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        reservation_id,
        value_uba,
        fee_uba,
    });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_minting_executed(
    state: &mut LedgerState,
    context: &LedgerContext,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    reservation_id: u64,
    ticket_id: u64,
    minted_uba: u128,
    agent_fee_uba: u128,
    pool_fee_uba: u128,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    let dust_before = agent.dust_uba();
    let outcome = agent.execute_minting(
        reservation_id,
        ticket_id,
        minted_uba,
        agent_fee_uba,
        pool_fee_uba,
        &context.settings,
    )?;

    if outcome.reservation.is_some() {
        log.log(LedgerFact::ReservationClosed {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            reservation_id,
            executed: true,
        });
    }
    if let Some(ticket) = outcome.mint.ticket {
        log.log(LedgerFact::TicketCreated {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            ticket_id: ticket.id,
            value_uba: ticket.value_uba,
        });
    }
    log_dust_if_changed(log, now, agent_vault, dust_before, outcome.mint.dust_uba);
    log.log(LedgerFact::UnderlyingChanged {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        kind: UnderlyingChangeKind::Minting,
        amount_uba: outcome.deposited_uba as i128,
        balance_uba: outcome.balance_uba,
    });
    Ok(())
}

fn apply_minting_payment_default(
    state: &mut LedgerState,
    context: &LedgerContext,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    reservation_id: u64,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    agent.remove_reservation(reservation_id, &context.settings)?;
    log.log(LedgerFact::ReservationClosed {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        reservation_id,
        executed: false,
    });
    Ok(())
}

fn apply_self_close(
    state: &mut LedgerState,
    context: &LedgerContext,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    value_uba: u128,
) -> Result<(), EventError> {
    if value_uba == 0 {
        return Err(EventError::SelfCloseOfZero);
    }
    let agent = state.agent_mut(agent_vault)?;
    let dust_before = agent.dust_uba();
    let outcome = agent.close_backing(value_uba, &context.settings)?;
    log_ticket_changes(log, now, agent_vault, &outcome.changes);
    let dust_after = agent.dust_uba();
    log_dust_if_changed(log, now, agent_vault, dust_before, dust_after);
    Ok(())
}

fn apply_redemption_requested(
    state: &mut LedgerState,
    context: &LedgerContext,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    request: RedemptionRequest,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    let (request_id, value_uba) = (request.id(), request.value_uba());
    let dust_before = agent.dust_uba();
    let outcome = agent.start_redemption(request, &context.settings)?;
    log.log(LedgerFact::RedemptionStarted {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        request_id,
        value_uba,
    });
    log_ticket_changes(log, now, agent_vault, &outcome.changes);
    let dust_after = agent.dust_uba();
    log_dust_if_changed(log, now, agent_vault, dust_before, dust_after);
    Ok(())
}

fn apply_redemption_payment(
    state: &mut LedgerState,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    request_id: u64,
    kind: RedemptionPaymentKind,
    spent_uba: u128,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    let outcome = agent.confirm_redemption_payment(request_id, kind, spent_uba)?;
    log.log(LedgerFact::UnderlyingChanged {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        kind: UnderlyingChangeKind::Redemption,
        amount_uba: -(spent_uba as i128),
        balance_uba: outcome.balance_uba,
    });
    if outcome.removed {
        log.log(LedgerFact::RedemptionClosed {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            request_id,
        });
    }
    Ok(())
}

fn apply_withdrawal_announced(
    state: &mut LedgerState,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    announcement_id: u64,
) -> Result<(), EventError> {
    state.agent_mut(agent_vault)?.announce_withdrawal(announcement_id)?;
    log.log(LedgerFact::WithdrawalAnnounced {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        announcement_id,
    });
    Ok(())
}

fn apply_withdrawal_confirmed(
    state: &mut LedgerState,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    announcement_id: u64,
    spent_uba: u128,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    let balance_uba = agent.confirm_withdrawal(announcement_id, spent_uba)?;
    log.log(LedgerFact::UnderlyingChanged {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        kind: UnderlyingChangeKind::Withdrawal,
        amount_uba: -(spent_uba as i128),
        balance_uba,
    });
    log.log(LedgerFact::WithdrawalClosed {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        announcement_id,
        confirmed: true,
    });
    Ok(())
}

fn apply_withdrawal_cancelled(
    state: &mut LedgerState,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    announcement_id: u64,
) -> Result<(), EventError> {
    state.agent_mut(agent_vault)?.cancel_withdrawal(announcement_id)?;
    log.log(LedgerFact::WithdrawalClosed {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        announcement_id,
        confirmed: false,
    });
    Ok(())
}

fn apply_topup(
    state: &mut LedgerState,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    amount_uba: u128,
) -> Result<(), EventError> {
    let balance_uba = state.agent_mut(agent_vault)?.topup_underlying(amount_uba);
    log.log(LedgerFact::UnderlyingChanged {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        kind: UnderlyingChangeKind::Topup,
        amount_uba: amount_uba as i128,
        balance_uba,
    });
    Ok(())
}

fn apply_dust_converted(
    state: &mut LedgerState,
    context: &LedgerContext,
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    ticket_id: u64,
) -> Result<(), EventError> {
    let agent = state.agent_mut(agent_vault)?;
    let dust_before = agent.dust_uba();
    let ticket = agent.convert_dust_to_ticket(ticket_id, &context.settings)?;
    log.log(LedgerFact::TicketCreated {
        timestamp: now,
        agent_vault: agent_vault.to_string(),
        ticket_id: ticket.id,
        value_uba: ticket.value_uba,
    });
    log_dust_if_changed(log, now, agent_vault, dust_before, agent.dust_uba());
    Ok(())
}

// ============================================================================
// Fact helpers
// ============================================================================

pub(crate) fn log_ticket_changes(
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    changes: &[TicketChange],
) {
    for change in changes {
        let fact = match *change {
            TicketChange::Created { id, value_uba } => LedgerFact::TicketCreated {
                timestamp: now,
                agent_vault: agent_vault.to_string(),
                ticket_id: id,
                value_uba,
            },
            TicketChange::Shrunk { id, value_uba } => LedgerFact::TicketShrunk {
                timestamp: now,
                agent_vault: agent_vault.to_string(),
                ticket_id: id,
                value_uba,
            },
            TicketChange::Deleted { id } => LedgerFact::TicketDeleted {
                timestamp: now,
                agent_vault: agent_vault.to_string(),
                ticket_id: id,
            },
        };
        log.log(fact);
    }
}

pub(crate) fn log_dust_if_changed(
    log: &mut FactLog,
    now: u64,
    agent_vault: &str,
    dust_before: u128,
    dust_after: u128,
) {
    if dust_before != dust_after {
        log.log(LedgerFact::DustChanged {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            dust_uba: dust_after,
        });
    }
}

fn log_pool_position(log: &mut FactLog, now: u64, agent: &AgentLedger, holder: &str) {
    log.log(LedgerFact::PoolPositionChanged {
        timestamp: now,
        agent_vault: agent.vault().to_string(),
        holder: holder.to_string(),
        token_balance: agent.pool().balance_of(holder),
        fee_debt_uba: agent.pool().debt_of(holder),
    });
}

fn log_collateral(log: &mut FactLog, now: u64, agent: &AgentLedger, collateral: CollateralClass) {
    log.log(LedgerFact::CollateralChanged {
        timestamp: now,
        agent_vault: agent.vault().to_string(),
        collateral,
        total_wei: agent.collateral_wei(collateral),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::{PriceQuote, PRICE_SCALE};
    use crate::models::LedgerSettings;

    fn setup() -> (LedgerState, LedgerContext, FactLog) {
        let context = LedgerContext::new(
            LedgerSettings::default(),
            PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
            PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
        );
        (LedgerState::new(), context, FactLog::new())
    }

    fn create_agent(state: &mut LedgerState, context: &LedgerContext, log: &mut FactLog) {
        ChainEvent::AgentCreated {
            agent_vault: "vault_1".to_string(),
            owner: "owner_1".to_string(),
            underlying_address: "UNDERLYING_1".to_string(),
        }
        .apply(state, context, log, 100)
        .unwrap();
    }

    #[test]
    fn test_agent_created_registers_and_logs() {
        let (mut state, context, mut log) = setup();
        create_agent(&mut state, &context, &mut log);

        assert_eq!(state.num_agents(), 1);
        assert_eq!(log.facts_of_type("agent_registered").len(), 1);
    }

    #[test]
    fn test_minting_flow_emits_facts() {
        let (mut state, context, mut log) = setup();
        create_agent(&mut state, &context, &mut log);

        ChainEvent::CollateralReserved {
            agent_vault: "vault_1".to_string(),
            reservation_id: 1,
            minter: "minter_1".to_string(),
            value_uba: 20_000,
            fee_uba: 1_000,
            first_underlying_block: 1,
            last_underlying_block: 100,
            last_underlying_timestamp: 10_000,
            payment_reference: "0xref".to_string(),
        }
        .apply(&mut state, &context, &mut log, 110)
        .unwrap();

        ChainEvent::MintingExecuted {
            agent_vault: "vault_1".to_string(),
            reservation_id: 1,
            redemption_ticket_id: 1,
            minted_uba: 20_000,
            agent_fee_uba: 600,
            pool_fee_uba: 400,
        }
        .apply(&mut state, &context, &mut log, 120)
        .unwrap();

        let agent = state.agent("vault_1").unwrap();
        // ticket carries minted + pool fee; 400 is below one lot so it is dust
        assert_eq!(agent.minted_uba(), 20_400);
        assert_eq!(agent.dust_uba(), 400);
        assert_eq!(agent.underlying_balance_uba(), 21_000);
        assert_eq!(agent.reserved_uba(), 0);

        assert_eq!(log.facts_of_type("reservation_created").len(), 1);
        assert_eq!(log.facts_of_type("reservation_closed").len(), 1);
        assert_eq!(log.facts_of_type("ticket_created").len(), 1);
        assert_eq!(log.facts_of_type("dust_changed").len(), 1);
        assert_eq!(log.facts_of_type("underlying_changed").len(), 1);
    }

    #[test]
    fn test_self_close_of_zero_rejected() {
        let (mut state, context, mut log) = setup();
        create_agent(&mut state, &context, &mut log);

        let err = ChainEvent::SelfClose {
            agent_vault: "vault_1".to_string(),
            value_uba: 0,
        }
        .apply(&mut state, &context, &mut log, 130)
        .unwrap_err();
        assert_eq!(err, EventError::SelfCloseOfZero);
        assert_eq!(err.to_string(), "self close of 0");
    }

    #[test]
    fn test_collateral_withdrawal_gated_on_status() {
        let (mut state, context, mut log) = setup();
        create_agent(&mut state, &context, &mut log);

        ChainEvent::CollateralDeposited {
            agent_vault: "vault_1".to_string(),
            collateral: CollateralClass::Class1,
            amount_wei: 5_000,
        }
        .apply(&mut state, &context, &mut log, 140)
        .unwrap();

        state
            .agent_mut("vault_1")
            .unwrap()
            .start_full_liquidation(150);

        let err = ChainEvent::CollateralWithdrawn {
            agent_vault: "vault_1".to_string(),
            collateral: CollateralClass::Class1,
            amount_wei: 1_000,
        }
        .apply(&mut state, &context, &mut log, 160)
        .unwrap_err();
        assert_eq!(err, EventError::InvalidAgentStatus);
    }

    #[test]
    fn test_pool_events_log_positions() {
        let (mut state, context, mut log) = setup();
        create_agent(&mut state, &context, &mut log);

        ChainEvent::PoolEnter {
            agent_vault: "vault_1".to_string(),
            holder: "provider_1".to_string(),
            tokens: 1_000,
            paid_fees_uba: 0,
        }
        .apply(&mut state, &context, &mut log, 170)
        .unwrap();

        ChainEvent::PoolTokenTransfer {
            agent_vault: "vault_1".to_string(),
            from: "provider_1".to_string(),
            to: "provider_2".to_string(),
            tokens: 400,
        }
        .apply(&mut state, &context, &mut log, 180)
        .unwrap();

        let positions = log.facts_of_type("pool_position_changed");
        assert_eq!(positions.len(), 3);
        let agent = state.agent("vault_1").unwrap();
        assert_eq!(agent.pool().balance_of("provider_1"), 600);
        assert_eq!(agent.pool().balance_of("provider_2"), 400);
    }

    #[test]
    fn test_destroy_requires_announcement() {
        let (mut state, context, mut log) = setup();
        create_agent(&mut state, &context, &mut log);

        let err = ChainEvent::AgentDestroyed {
            agent_vault: "vault_1".to_string(),
        }
        .apply(&mut state, &context, &mut log, 190)
        .unwrap_err();
        assert_eq!(err, EventError::InvalidAgentStatus);

        state.agent_mut("vault_1").unwrap().announce_destroy().unwrap();
        ChainEvent::AgentDestroyed {
            agent_vault: "vault_1".to_string(),
        }
        .apply(&mut state, &context, &mut log, 200)
        .unwrap();
        assert_eq!(state.num_agents(), 0);
        assert_eq!(log.facts_of_type("agent_destroyed").len(), 1);
    }

    #[test]
    fn test_unknown_agent_fails_application() {
        let (mut state, context, mut log) = setup();
        let err = ChainEvent::UnderlyingTopup {
            agent_vault: "nobody".to_string(),
            amount_uba: 1,
        }
        .apply(&mut state, &context, &mut log, 210)
        .unwrap_err();
        assert!(matches!(err, EventError::State(StateError::UnknownAgent { .. })));
    }
}

//! Type conversions at the FFI boundary
//!
//! Converts between Python dicts and the crate's settings, events, proofs,
//! facts and info structs.

use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::chain::{NonExistencePaymentProof, PaymentProof};
use crate::core::units::PriceQuote;
use crate::events::ChainEvent;
use crate::models::{
    AgentStatus, ChallengeKind, CollateralClass, LedgerFact, LedgerSettings,
    RedemptionPaymentKind, UnderlyingChangeKind,
};
use crate::tracker::AgentInfo;

// ========================================================================
// PyDict Extraction Helpers
// ========================================================================

/// Extract a required field from a Python dict with a clear error message.
fn extract_required<'a, T>(dict: &'a PyDict, key: &str) -> PyResult<T>
where
    T: FromPyObject<'a>,
{
    dict.get_item(key)?
        .ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Missing required field '{}'",
                key
            ))
        })?
        .extract()
}

/// Extract a field, falling back to a default when it is missing.
fn extract_with_default<'a, T>(dict: &'a PyDict, key: &str, default: T) -> PyResult<T>
where
    T: FromPyObject<'a>,
{
    match dict.get_item(key)? {
        Some(value) => value.extract(),
        None => Ok(default),
    }
}

fn invalid_value(message: String) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(message)
}

// ========================================================================
// Settings and Prices
// ========================================================================

/// Convert a Python dict to LedgerSettings.
///
/// Every field is optional; missing fields take the crate defaults, so a
/// Python caller only spells out what it changes.
pub fn parse_settings(py_settings: &PyDict) -> PyResult<LedgerSettings> {
    let d = LedgerSettings::default();
    let settings = LedgerSettings {
        asset_minting_granularity_uba: extract_with_default(
            py_settings,
            "asset_minting_granularity_uba",
            d.asset_minting_granularity_uba,
        )?,
        lot_size_amg: extract_with_default(py_settings, "lot_size_amg", d.lot_size_amg)?,
        pool_fee_share_bips: extract_with_default(
            py_settings,
            "pool_fee_share_bips",
            d.pool_fee_share_bips,
        )?,
        payment_challenge_reward_bips: extract_with_default(
            py_settings,
            "payment_challenge_reward_bips",
            d.payment_challenge_reward_bips,
        )?,
        payment_challenge_reward_usd5: extract_with_default(
            py_settings,
            "payment_challenge_reward_usd5",
            d.payment_challenge_reward_usd5,
        )?,
        ccb_time_seconds: extract_with_default(py_settings, "ccb_time_seconds", d.ccb_time_seconds)?,
        liquidation_step_seconds: extract_with_default(
            py_settings,
            "liquidation_step_seconds",
            d.liquidation_step_seconds,
        )?,
        liquidation_factor_increment_bips: extract_with_default(
            py_settings,
            "liquidation_factor_increment_bips",
            d.liquidation_factor_increment_bips,
        )?,
        liquidation_factor_class1_cap_bips: extract_with_default(
            py_settings,
            "liquidation_factor_class1_cap_bips",
            d.liquidation_factor_class1_cap_bips,
        )?,
        liquidation_factor_cap_bips: extract_with_default(
            py_settings,
            "liquidation_factor_cap_bips",
            d.liquidation_factor_cap_bips,
        )?,
        ccb_min_collateral_ratio_bips: extract_with_default(
            py_settings,
            "ccb_min_collateral_ratio_bips",
            d.ccb_min_collateral_ratio_bips,
        )?,
        min_collateral_ratio_bips: extract_with_default(
            py_settings,
            "min_collateral_ratio_bips",
            d.min_collateral_ratio_bips,
        )?,
        safety_min_collateral_ratio_bips: extract_with_default(
            py_settings,
            "safety_min_collateral_ratio_bips",
            d.safety_min_collateral_ratio_bips,
        )?,
        redemption_default_factor_class1_bips: extract_with_default(
            py_settings,
            "redemption_default_factor_class1_bips",
            d.redemption_default_factor_class1_bips,
        )?,
        redemption_default_factor_pool_bips: extract_with_default(
            py_settings,
            "redemption_default_factor_pool_bips",
            d.redemption_default_factor_pool_bips,
        )?,
    };
    Ok(settings)
}

/// Convert a Python dict to a PriceQuote.
pub fn parse_price(py_price: &PyDict) -> PyResult<PriceQuote> {
    Ok(PriceQuote {
        amg_token_price: extract_required(py_price, "amg_token_price")?,
        usd5_token_price: extract_required(py_price, "usd5_token_price")?,
    })
}

// ========================================================================
// Events and Proofs
// ========================================================================

fn parse_collateral_class(py_event: &PyDict) -> PyResult<CollateralClass> {
    let class: String = extract_required(py_event, "collateral")?;
    match class.as_str() {
        "class1" => Ok(CollateralClass::Class1),
        "pool" => Ok(CollateralClass::Pool),
        other => Err(invalid_value(format!(
            "Invalid collateral class: '{}'. Must be 'class1' or 'pool'",
            other
        ))),
    }
}

/// Convert a Python dict to a ChainEvent.
///
/// The `type` field selects the event; the remaining keys mirror the serde
/// field names, so the same dicts round-trip through JSON unchanged.
pub fn parse_chain_event(py_event: &PyDict) -> PyResult<ChainEvent> {
    let event_type: String = extract_required(py_event, "type")?;
    let agent_vault: String = extract_required(py_event, "agent_vault")?;

    let event = match event_type.as_str() {
        "agent_created" => ChainEvent::AgentCreated {
            agent_vault,
            owner: extract_required(py_event, "owner")?,
            underlying_address: extract_required(py_event, "underlying_address")?,
        },
        "collateral_reserved" => ChainEvent::CollateralReserved {
            agent_vault,
            reservation_id: extract_required(py_event, "reservation_id")?,
            minter: extract_required(py_event, "minter")?,
            value_uba: extract_required(py_event, "value_uba")?,
            fee_uba: extract_required(py_event, "fee_uba")?,
            first_underlying_block: extract_required(py_event, "first_underlying_block")?,
            last_underlying_block: extract_required(py_event, "last_underlying_block")?,
            last_underlying_timestamp: extract_required(py_event, "last_underlying_timestamp")?,
            payment_reference: extract_required(py_event, "payment_reference")?,
        },
        "minting_executed" => ChainEvent::MintingExecuted {
            agent_vault,
            reservation_id: extract_with_default(py_event, "reservation_id", 0)?,
            redemption_ticket_id: extract_required(py_event, "redemption_ticket_id")?,
            minted_uba: extract_required(py_event, "minted_uba")?,
            agent_fee_uba: extract_with_default(py_event, "agent_fee_uba", 0)?,
            pool_fee_uba: extract_with_default(py_event, "pool_fee_uba", 0)?,
        },
        "minting_payment_default" => ChainEvent::MintingPaymentDefault {
            agent_vault,
            reservation_id: extract_required(py_event, "reservation_id")?,
        },
        "self_close" => ChainEvent::SelfClose {
            agent_vault,
            value_uba: extract_required(py_event, "value_uba")?,
        },
        "redemption_requested" => ChainEvent::RedemptionRequested {
            agent_vault,
            request_id: extract_required(py_event, "request_id")?,
            redeemer: extract_required(py_event, "redeemer")?,
            value_uba: extract_required(py_event, "value_uba")?,
            fee_uba: extract_with_default(py_event, "fee_uba", 0)?,
            first_underlying_block: extract_required(py_event, "first_underlying_block")?,
            last_underlying_block: extract_required(py_event, "last_underlying_block")?,
            last_underlying_timestamp: extract_required(py_event, "last_underlying_timestamp")?,
            payment_address: extract_required(py_event, "payment_address")?,
            payment_reference: extract_required(py_event, "payment_reference")?,
            pool_self_close: extract_with_default(py_event, "pool_self_close", false)?,
        },
        "redemption_payment_confirmed" => {
            let kind: String = extract_required(py_event, "kind")?;
            let kind = match kind.as_str() {
                "performed" => RedemptionPaymentKind::Performed,
                "blocked" => RedemptionPaymentKind::Blocked,
                "failed" => RedemptionPaymentKind::Failed,
                other => {
                    return Err(invalid_value(format!(
                        "Invalid payment kind: '{}'. Must be 'performed', 'blocked' or 'failed'",
                        other
                    )));
                }
            };
            ChainEvent::RedemptionPaymentConfirmed {
                agent_vault,
                request_id: extract_required(py_event, "request_id")?,
                kind,
                spent_uba: extract_required(py_event, "spent_uba")?,
            }
        }
        "underlying_withdrawal_announced" => ChainEvent::UnderlyingWithdrawalAnnounced {
            agent_vault,
            announcement_id: extract_required(py_event, "announcement_id")?,
        },
        "underlying_withdrawal_confirmed" => ChainEvent::UnderlyingWithdrawalConfirmed {
            agent_vault,
            announcement_id: extract_required(py_event, "announcement_id")?,
            spent_uba: extract_required(py_event, "spent_uba")?,
        },
        "underlying_withdrawal_cancelled" => ChainEvent::UnderlyingWithdrawalCancelled {
            agent_vault,
            announcement_id: extract_required(py_event, "announcement_id")?,
        },
        "underlying_topup" => ChainEvent::UnderlyingTopup {
            agent_vault,
            amount_uba: extract_required(py_event, "amount_uba")?,
        },
        "pool_enter" => ChainEvent::PoolEnter {
            agent_vault,
            holder: extract_required(py_event, "holder")?,
            tokens: extract_required(py_event, "tokens")?,
            paid_fees_uba: extract_with_default(py_event, "paid_fees_uba", 0)?,
        },
        "pool_exit" => ChainEvent::PoolExit {
            agent_vault,
            holder: extract_required(py_event, "holder")?,
            burned_tokens: extract_required(py_event, "burned_tokens")?,
            received_fees_uba: extract_with_default(py_event, "received_fees_uba", 0)?,
        },
        "pool_token_transfer" => ChainEvent::PoolTokenTransfer {
            agent_vault,
            from: extract_required(py_event, "from")?,
            to: extract_required(py_event, "to")?,
            tokens: extract_required(py_event, "tokens")?,
        },
        "pool_fees_withdrawn" => ChainEvent::PoolFeesWithdrawn {
            agent_vault,
            holder: extract_required(py_event, "holder")?,
            amount_uba: extract_required(py_event, "amount_uba")?,
        },
        "collateral_deposited" => ChainEvent::CollateralDeposited {
            agent_vault,
            collateral: parse_collateral_class(py_event)?,
            amount_wei: extract_required(py_event, "amount_wei")?,
        },
        "collateral_withdrawn" => ChainEvent::CollateralWithdrawn {
            agent_vault,
            collateral: parse_collateral_class(py_event)?,
            amount_wei: extract_required(py_event, "amount_wei")?,
        },
        "dust_changed" => ChainEvent::DustChanged {
            agent_vault,
            dust_uba: extract_required(py_event, "dust_uba")?,
        },
        "dust_converted_to_ticket" => ChainEvent::DustConvertedToTicket {
            agent_vault,
            ticket_id: extract_required(py_event, "ticket_id")?,
        },
        "agent_destroyed" => ChainEvent::AgentDestroyed { agent_vault },
        other => {
            return Err(invalid_value(format!("Unknown event type: {}", other)));
        }
    };
    Ok(event)
}

/// Convert a Python dict to an attested payment proof.
pub fn parse_payment_proof(py_proof: &PyDict) -> PyResult<PaymentProof> {
    Ok(PaymentProof {
        tx_hash: extract_required(py_proof, "tx_hash")?,
        source_address: extract_required(py_proof, "source_address")?,
        target_address: extract_required(py_proof, "target_address")?,
        payment_reference: extract_with_default(py_proof, "payment_reference", String::new())?,
        spent_uba: extract_required(py_proof, "spent_uba")?,
        received_uba: extract_required(py_proof, "received_uba")?,
        block_number: extract_required(py_proof, "block_number")?,
        block_timestamp: extract_required(py_proof, "block_timestamp")?,
    })
}

/// Convert a Python dict to an attested non-existence proof.
pub fn parse_nonexistence_proof(py_proof: &PyDict) -> PyResult<NonExistencePaymentProof> {
    Ok(NonExistencePaymentProof {
        payment_reference: extract_required(py_proof, "payment_reference")?,
        destination_address: extract_required(py_proof, "destination_address")?,
        amount_uba: extract_required(py_proof, "amount_uba")?,
        first_block: extract_required(py_proof, "first_block")?,
        last_block: extract_required(py_proof, "last_block")?,
        last_block_timestamp: extract_required(py_proof, "last_block_timestamp")?,
    })
}

// ========================================================================
// Facts and Info Out
// ========================================================================

pub fn status_to_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Normal => "normal",
        AgentStatus::Ccb => "ccb",
        AgentStatus::Liquidation => "liquidation",
        AgentStatus::FullLiquidation => "full_liquidation",
        AgentStatus::Destroying => "destroying",
    }
}

fn class_to_str(class: CollateralClass) -> &'static str {
    match class {
        CollateralClass::Class1 => "class1",
        CollateralClass::Pool => "pool",
    }
}

fn challenge_kind_to_str(kind: ChallengeKind) -> &'static str {
    match kind {
        ChallengeKind::IllegalPayment => "illegal_payment",
        ChallengeKind::DoublePayment => "double_payment",
        ChallengeKind::FreeBalanceNegative => "free_balance_negative",
    }
}

fn change_kind_to_str(kind: UnderlyingChangeKind) -> &'static str {
    match kind {
        UnderlyingChangeKind::Minting => "minting",
        UnderlyingChangeKind::Redemption => "redemption",
        UnderlyingChangeKind::Topup => "topup",
        UnderlyingChangeKind::Withdrawal => "withdrawal",
    }
}

/// Convert a LedgerFact to a Python dict.
///
/// Every fact carries `type`, `timestamp` and `agent_vault`; the rest of the
/// keys mirror the variant's serde field names.
pub fn fact_to_py(py: Python<'_>, fact: &LedgerFact) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("type", fact.fact_type())?;
    dict.set_item("timestamp", fact.timestamp())?;
    dict.set_item("agent_vault", fact.agent_vault())?;

    match fact {
        LedgerFact::AgentRegistered {
            underlying_address, ..
        } => {
            dict.set_item("underlying_address", underlying_address)?;
        }
        LedgerFact::ReservationCreated {
            reservation_id,
            value_uba,
            fee_uba,
            ..
        } => {
            dict.set_item("reservation_id", reservation_id)?;
            dict.set_item("value_uba", value_uba)?;
            dict.set_item("fee_uba", fee_uba)?;
        }
        LedgerFact::ReservationClosed {
            reservation_id,
            executed,
            ..
        } => {
            dict.set_item("reservation_id", reservation_id)?;
            dict.set_item("executed", executed)?;
        }
        LedgerFact::TicketCreated {
            ticket_id,
            value_uba,
            ..
        }
        | LedgerFact::TicketShrunk {
            ticket_id,
            value_uba,
            ..
        } => {
            dict.set_item("ticket_id", ticket_id)?;
            dict.set_item("value_uba", value_uba)?;
        }
        LedgerFact::TicketDeleted { ticket_id, .. } => {
            dict.set_item("ticket_id", ticket_id)?;
        }
        LedgerFact::DustChanged { dust_uba, .. } => {
            dict.set_item("dust_uba", dust_uba)?;
        }
        LedgerFact::RedemptionStarted {
            request_id,
            value_uba,
            ..
        } => {
            dict.set_item("request_id", request_id)?;
            dict.set_item("value_uba", value_uba)?;
        }
        LedgerFact::RedemptionClosed { request_id, .. } => {
            dict.set_item("request_id", request_id)?;
        }
        LedgerFact::RedemptionDefaulted {
            request_id,
            paid_class1_wei,
            paid_pool_wei,
            ..
        } => {
            dict.set_item("request_id", request_id)?;
            dict.set_item("paid_class1_wei", paid_class1_wei)?;
            dict.set_item("paid_pool_wei", paid_pool_wei)?;
        }
        LedgerFact::UnderlyingChanged {
            kind,
            amount_uba,
            balance_uba,
            ..
        } => {
            dict.set_item("kind", change_kind_to_str(*kind))?;
            dict.set_item("amount_uba", amount_uba)?;
            dict.set_item("balance_uba", balance_uba)?;
        }
        LedgerFact::WithdrawalAnnounced {
            announcement_id, ..
        } => {
            dict.set_item("announcement_id", announcement_id)?;
        }
        LedgerFact::WithdrawalClosed {
            announcement_id,
            confirmed,
            ..
        } => {
            dict.set_item("announcement_id", announcement_id)?;
            dict.set_item("confirmed", confirmed)?;
        }
        LedgerFact::PoolPositionChanged {
            holder,
            token_balance,
            fee_debt_uba,
            ..
        } => {
            dict.set_item("holder", holder)?;
            dict.set_item("token_balance", token_balance)?;
            dict.set_item("fee_debt_uba", fee_debt_uba)?;
        }
        LedgerFact::StatusChanged { status, .. } => {
            dict.set_item("status", status_to_str(*status))?;
        }
        LedgerFact::LiquidationPerformed {
            liquidator,
            liquidated_uba,
            paid_class1_wei,
            paid_pool_wei,
            ..
        } => {
            dict.set_item("liquidator", liquidator)?;
            dict.set_item("liquidated_uba", liquidated_uba)?;
            dict.set_item("paid_class1_wei", paid_class1_wei)?;
            dict.set_item("paid_pool_wei", paid_pool_wei)?;
        }
        LedgerFact::ChallengeConfirmed {
            challenger,
            kind,
            rewarded_class1_wei,
            ..
        } => {
            dict.set_item("challenger", challenger)?;
            dict.set_item("kind", challenge_kind_to_str(*kind))?;
            dict.set_item("rewarded_class1_wei", rewarded_class1_wei)?;
        }
        LedgerFact::CollateralChanged {
            collateral,
            total_wei,
            ..
        } => {
            dict.set_item("collateral", class_to_str(*collateral))?;
            dict.set_item("total_wei", total_wei)?;
        }
        LedgerFact::AgentDestroyed { .. } => {}
    }

    Ok(dict.into())
}

/// Convert an AgentInfo to a Python dict.
pub fn agent_info_to_py(py: Python<'_>, info: &AgentInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("vault", &info.vault)?;
    dict.set_item("status", status_to_str(info.status))?;
    dict.set_item("minted_uba", info.minted_uba)?;
    dict.set_item("reserved_uba", info.reserved_uba)?;
    dict.set_item("redeeming_uba", info.redeeming_uba)?;
    dict.set_item("dust_uba", info.dust_uba)?;
    dict.set_item("underlying_balance_uba", info.underlying_balance_uba)?;
    dict.set_item(
        "free_underlying_balance_uba",
        info.free_underlying_balance_uba,
    )?;
    dict.set_item("class1_collateral_wei", info.class1_collateral_wei)?;
    dict.set_item("pool_collateral_wei", info.pool_collateral_wei)?;
    dict.set_item("class1_collateral_ratio", info.class1_collateral_ratio)?;
    dict.set_item("pool_collateral_ratio", info.pool_collateral_ratio)?;
    Ok(dict.into())
}

//! Liquidation status machine and premium arithmetic
//!
//! Undercollateralized agents move through a graduated status machine:
//!
//! ```text
//! Normal → Ccb (collateral call band, grace period)
//!        → Liquidation (premium grows per time step)
//!        → FullLiquidation (challenge confirmed, no way back)
//! ```
//!
//! Liquidators burn f-assets against a liquidating agent and are paid
//! collateral worth more than the burned assets. The premium over par is the
//! liquidation factor, growing stepwise with time in liquidation until a cap.
//! The premium is split between class-1 collateral and the pool.
//!
//! # Critical Invariants
//!
//! - All ratio and factor comparisons are BIPS integer math, never floats
//! - The class-1 factor saturates at its own cap and stays flat; the pool
//!   factor covers the rest of the total premium
//! - An expired collateral call band backdates the liquidation start to the
//!   moment the band expired, so the premium step is unaffected by when the
//!   transition was actually triggered

use thiserror::Error;

use crate::core::units::{mul_bips, PriceQuote, MAX_BIPS};
use crate::models::{AgentLedger, AgentStatus, CollateralClass, LedgerContext, LedgerSettings};

/// Errors from liquidation operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LiquidationError {
    #[error("agent not in liquidation")]
    NotInLiquidation,

    #[error("cannot stop liquidation")]
    CannotStopLiquidation,
}

/// Collateral ratio in BIPS: collateral value over backed asset value.
///
/// An agent backing nothing is infinitely collateralized, reported as
/// `u128::MAX`.
pub fn collateral_ratio_bips(collateral_wei: u128, backed_amg: u128, price: &PriceQuote) -> u128 {
    let backing_wei = price.convert_amg_to_token(backed_amg);
    if backing_wei == 0 {
        return u128::MAX;
    }
    collateral_wei * MAX_BIPS / backing_wei
}

/// The agent's class-1 collateral ratio against everything it backs.
pub fn class1_ratio_bips(agent: &AgentLedger, context: &LedgerContext) -> u128 {
    let backed_amg = context.settings.uba_to_amg(agent.backed_uba());
    collateral_ratio_bips(
        agent.collateral_wei(CollateralClass::Class1),
        backed_amg,
        &context.class1_price,
    )
}

/// The pool collateral ratio. Self-close redemptions do not count against
/// the pool, so the backing here can be smaller than for class-1.
pub fn pool_ratio_bips(agent: &AgentLedger, context: &LedgerContext) -> u128 {
    let backed_amg = context.settings.uba_to_amg(agent.pool_backed_uba());
    collateral_ratio_bips(
        agent.collateral_wei(CollateralClass::Pool),
        backed_amg,
        &context.pool_price,
    )
}

/// The status the current ratios warrant, ignoring any time already spent in
/// the call band. The worst of the two ratios decides.
pub fn target_status(
    class1_ratio_bips: u128,
    pool_ratio_bips: u128,
    settings: &LedgerSettings,
) -> AgentStatus {
    let worst = class1_ratio_bips.min(pool_ratio_bips);
    if worst >= u128::from(settings.min_collateral_ratio_bips) {
        AgentStatus::Normal
    } else if worst >= u128::from(settings.ccb_min_collateral_ratio_bips) {
        AgentStatus::Ccb
    } else {
        AgentStatus::Liquidation
    }
}

/// Evaluate the agent's ratios and advance the status machine one step.
///
/// Returns the transition that happened, or `None` when nothing changed.
/// Never downgrades: recovery out of the call band or liquidation goes
/// through [`end_liquidation`], and full liquidation only ever starts from a
/// confirmed challenge.
pub fn update_liquidation_status(
    agent: &mut AgentLedger,
    context: &LedgerContext,
    now: u64,
) -> Option<(AgentStatus, AgentStatus)> {
    let target = target_status(
        class1_ratio_bips(agent, context),
        pool_ratio_bips(agent, context),
        &context.settings,
    );
    match agent.status() {
        AgentStatus::Normal => match target {
            AgentStatus::Ccb => {
                agent.enter_ccb(now);
                Some((AgentStatus::Normal, AgentStatus::Ccb))
            }
            AgentStatus::Liquidation => {
                agent.start_liquidation(now, &context.settings);
                Some((AgentStatus::Normal, AgentStatus::Liquidation))
            }
            _ => None,
        },
        AgentStatus::Ccb => {
            let expired =
                now >= agent.ccb_start_timestamp() + context.settings.ccb_time_seconds;
            if target == AgentStatus::Liquidation || expired {
                agent.start_liquidation(now, &context.settings);
                Some((AgentStatus::Ccb, AgentStatus::Liquidation))
            } else {
                None
            }
        }
        // already liquidating, or past the point of status evaluation
        AgentStatus::Liquidation | AgentStatus::FullLiquidation | AgentStatus::Destroying => None,
    }
}

/// Leave the call band or liquidation once both ratios are safe again.
///
/// Full liquidation cannot be stopped. Everything else requires both ratios
/// at or above the safety floor, which is higher than the entry threshold so
/// agents do not oscillate at the boundary.
pub fn end_liquidation(
    agent: &mut AgentLedger,
    context: &LedgerContext,
) -> Result<(), LiquidationError> {
    if agent.status() == AgentStatus::FullLiquidation {
        return Err(LiquidationError::CannotStopLiquidation);
    }
    let safety = u128::from(context.settings.safety_min_collateral_ratio_bips);
    if class1_ratio_bips(agent, context) < safety || pool_ratio_bips(agent, context) < safety {
        return Err(LiquidationError::CannotStopLiquidation);
    }
    agent.return_to_normal();
    Ok(())
}

/// Premium step for a liquidation running since `start`. The first step is
/// live immediately.
pub fn liquidation_step(now: u64, start: u64, settings: &LedgerSettings) -> u64 {
    1 + now.saturating_sub(start) / settings.liquidation_step_seconds
}

/// Premium factors for one liquidation payout, all in BIPS of the
/// liquidated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationFactors {
    pub total_bips: u128,
    pub class1_bips: u128,
    pub pool_bips: u128,
}

/// Compute the premium split at a given step.
///
/// The total factor grows by `liquidation_factor_increment_bips` per step up
/// to the cap. Class-1 pays at most its own cap; the pool covers whatever
/// class-1 cannot, where "cannot" is bounded by the agent's actual class-1
/// ratio.
///
/// # Example
/// ```
/// use fasset_ledger_core_rs::enforcement::liquidation::liquidation_factors;
/// use fasset_ledger_core_rs::models::LedgerSettings;
///
/// let settings = LedgerSettings::default();
/// let f1 = liquidation_factors(1, 20_000, &settings);
/// let f3 = liquidation_factors(3, 20_000, &settings);
/// assert_eq!(f1.class1_bips, f3.class1_bips); // flat at the class-1 cap
/// assert!(f3.pool_bips > f1.pool_bips);
/// ```
pub fn liquidation_factors(
    step: u64,
    class1_ratio_bips: u128,
    settings: &LedgerSettings,
) -> LiquidationFactors {
    let total_bips = (u128::from(step) * u128::from(settings.liquidation_factor_increment_bips))
        .min(u128::from(settings.liquidation_factor_cap_bips));
    let class1_bips = total_bips.min(u128::from(settings.liquidation_factor_class1_cap_bips));
    let pool_bips = total_bips - class1_bips.min(class1_ratio_bips);
    LiquidationFactors {
        total_bips,
        class1_bips,
        pool_bips,
    }
}

/// Collateral owed for a liquidated amount, split per collateral class.
/// Returns `(class1_wei, pool_wei)` before clamping to actual holdings.
pub fn liquidation_rewards(
    liquidated_amg: u128,
    factors: &LiquidationFactors,
    context: &LedgerContext,
) -> (u128, u128) {
    let class1_wei = context
        .class1_price
        .convert_amg_to_token(mul_bips(liquidated_amg, factors.class1_bips));
    let pool_wei = context
        .pool_price
        .convert_amg_to_token(mul_bips(liquidated_amg, factors.pool_bips));
    (class1_wei, pool_wei)
}

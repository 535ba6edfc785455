//! Payment challenges against agent underlying addresses
//!
//! Every payment leaving an agent's underlying address must be justified by
//! an open redemption or an announced withdrawal. Anyone can challenge a
//! payment that is not; a confirmed challenge puts the agent into full
//! liquidation and pays the challenger a reward from class-1 collateral.
//!
//! Three challenge types exist:
//!
//! - **illegal payment**: one payment justified by nothing
//! - **double payment**: two distinct payments carrying the same reference
//! - **free balance negative**: a set of payments that together overdraw the
//!   backing the agent owes, even if each one is individually justified
//!
//! # Critical Invariants
//!
//! - An agent already in full liquidation cannot be challenged again
//! - Only payments from the agent's own underlying address count
//! - Verification never mutates; the caller applies the consequences after
//!   a challenge verifies

use thiserror::Error;

use crate::chain::PaymentProof;
use crate::core::{reference, units};
use crate::models::{AgentLedger, AgentStatus, LedgerContext};

/// Rejection reasons for the three challenge types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("chlg: already liquidating")]
    AlreadyLiquidating,

    #[error("chlg dbl: already liquidating")]
    DoubleAlreadyLiquidating,

    #[error("mult chlg: already liquidating")]
    MultipleAlreadyLiquidating,

    #[error("chlg: not agent's address")]
    WrongSourceAddress,

    #[error("matching redemption active")]
    MatchingRedemptionActive,

    #[error("matching ongoing announced pmt")]
    MatchingAnnouncedWithdrawal,

    #[error("chlg dbl: same transaction")]
    SameTransaction,

    #[error("challenge: not duplicate")]
    NotDuplicate,

    #[error("mult chlg: repeated transaction")]
    RepeatedTransaction,

    #[error("mult chlg: enough balance")]
    EnoughFreeBalance,
}

/// Verify an illegal payment challenge.
///
/// The payment is legal only when its reference matches a redemption whose
/// underlying side is still owed, or the currently announced withdrawal.
pub fn verify_illegal_payment(
    agent: &AgentLedger,
    proof: &PaymentProof,
) -> Result<(), ChallengeError> {
    if agent.status() == AgentStatus::FullLiquidation {
        return Err(ChallengeError::AlreadyLiquidating);
    }
    if proof.source_address != agent.underlying_address() {
        return Err(ChallengeError::WrongSourceAddress);
    }
    if matches_open_redemption(agent, &proof.payment_reference) {
        return Err(ChallengeError::MatchingRedemptionActive);
    }
    let announcement_id = agent.announced_withdrawal_id();
    if announcement_id != 0
        && proof.payment_reference == reference::withdrawal_announcement(announcement_id)
    {
        return Err(ChallengeError::MatchingAnnouncedWithdrawal);
    }
    Ok(())
}

/// Verify a double payment challenge: two distinct transactions from the
/// agent's address carrying the same payment reference.
pub fn verify_double_payment(
    agent: &AgentLedger,
    proof1: &PaymentProof,
    proof2: &PaymentProof,
) -> Result<(), ChallengeError> {
    if agent.status() == AgentStatus::FullLiquidation {
        return Err(ChallengeError::DoubleAlreadyLiquidating);
    }
    if proof1.tx_hash == proof2.tx_hash {
        return Err(ChallengeError::SameTransaction);
    }
    if proof1.source_address != agent.underlying_address()
        || proof2.source_address != agent.underlying_address()
    {
        return Err(ChallengeError::WrongSourceAddress);
    }
    if proof1.payment_reference != proof2.payment_reference {
        return Err(ChallengeError::NotDuplicate);
    }
    Ok(())
}

/// Verify a free balance negative challenge.
///
/// Sums what the payments spent, crediting back the value of any redemption
/// a payment legitimately serves. The challenge holds when the net spend
/// exceeds the agent's accounted free balance, meaning the agent dipped into
/// backing it still owes.
pub fn verify_free_balance_negative(
    agent: &AgentLedger,
    proofs: &[PaymentProof],
) -> Result<(), ChallengeError> {
    if agent.status() == AgentStatus::FullLiquidation {
        return Err(ChallengeError::MultipleAlreadyLiquidating);
    }
    for (i, proof) in proofs.iter().enumerate() {
        if proofs[..i].iter().any(|p| p.tx_hash == proof.tx_hash) {
            return Err(ChallengeError::RepeatedTransaction);
        }
        if proof.source_address != agent.underlying_address() {
            return Err(ChallengeError::WrongSourceAddress);
        }
    }

    let mut net_spent: i128 = 0;
    for proof in proofs {
        net_spent += proof.spent_uba as i128;
        if let Some(request) = agent
            .redemptions()
            .find(|r| !r.underlying_released() && r.payment_reference() == proof.payment_reference)
        {
            net_spent -= request.value_uba() as i128;
        }
    }

    if net_spent <= agent.free_underlying_balance_uba() {
        return Err(ChallengeError::EnoughFreeBalance);
    }
    Ok(())
}

/// Challenger reward in class-1 collateral wei, before clamping to what the
/// agent actually holds: a share of everything backed at challenge time plus
/// a flat component.
pub fn challenger_reward_wei(agent: &AgentLedger, context: &LedgerContext) -> u128 {
    let settings = &context.settings;
    let backed_amg = settings.uba_to_amg(agent.backed_uba());
    let reward_amg = units::mul_bips(
        backed_amg,
        u128::from(settings.payment_challenge_reward_bips),
    );
    context.class1_price.convert_amg_to_token(reward_amg)
        + context
            .class1_price
            .convert_usd5_to_token(settings.payment_challenge_reward_usd5)
}

fn matches_open_redemption(agent: &AgentLedger, payment_reference: &str) -> bool {
    agent
        .redemptions()
        .any(|r| !r.underlying_released() && r.payment_reference() == payment_reference)
}

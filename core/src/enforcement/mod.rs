//! Enforcement: challenges and liquidation
//!
//! The accounting models record what agents do; this module decides what
//! happens when they misbehave. Challenges police the underlying address,
//! liquidation polices collateral ratios. Both are pure over the models:
//! they verify and compute, the tracker applies the consequences.

pub mod challenges;
pub mod liquidation;

pub use challenges::{
    challenger_reward_wei, verify_double_payment, verify_free_balance_negative,
    verify_illegal_payment, ChallengeError,
};
pub use liquidation::{
    class1_ratio_bips, collateral_ratio_bips, end_liquidation, liquidation_factors,
    liquidation_rewards, liquidation_step, pool_ratio_bips, target_status,
    update_liquidation_status, LiquidationError, LiquidationFactors,
};

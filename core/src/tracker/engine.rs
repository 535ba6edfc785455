//! Ledger tracker
//!
//! The tracker owns the complete ledger: every agent's accounting, the
//! pricing context, the ledger clock and the fact log. Chain events flow in
//! through [`LedgerTracker::apply_event`]; enforcement operations (redemption
//! defaults, challenges, liquidation) have dedicated entry points because
//! they verify proofs and pay out collateral rather than mirror the chain.
//!
//! # Critical Invariants
//!
//! - **Validate-then-commit**: a failed operation leaves no partial state
//! - **Fact ordering**: facts are appended in mutation order and stamped
//!   with the ledger clock
//! - **Payouts clamp**: default payouts and rewards never fail, they pay
//!   out at most the collateral actually held
//! - **Time is monotonic**: the clock only moves forward

use serde::Serialize;

use crate::chain::{NonExistencePaymentProof, PaymentProof};
use crate::core::units::{mul_bips, PriceQuote, MAX_BIPS};
use crate::enforcement::challenges::{self, ChallengeError};
use crate::enforcement::liquidation::{self, LiquidationError};
use crate::events::handler::{log_dust_if_changed, log_ticket_changes};
use crate::events::{ChainEvent, EventError};
use crate::models::{
    AgentError, AgentLedger, AgentStatus, ChallengeKind, CollateralClass, FactLog, LedgerContext,
    LedgerFact, LedgerState, RedemptionError, StateError,
};
use crate::tracker::checkpoint::{
    compute_settings_hash, validate_snapshot, AgentSnapshot, LedgerSnapshot,
};

/// Tracker error types
#[derive(Debug, PartialEq, Eq)]
pub enum TrackerError {
    /// Agent lookup or registration failed
    State(StateError),

    /// Agent accounting operation failed
    Agent(AgentError),

    /// Chain event application failed
    Event(EventError),

    /// Challenge did not verify
    Challenge(ChallengeError),

    /// Liquidation lifecycle operation failed
    Liquidation(LiquidationError),

    /// Non-payment proof fields do not match the redemption request
    NonPaymentMismatch,

    /// Payment window still open at the proof's end
    DefaultTooEarly,

    /// Proof window starts after the payment window opened
    ProofWindowTooShort,

    /// Snapshot serialization failed
    Serialization(String),

    /// Snapshot failed validation against the settings or itself
    Snapshot(String),
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::State(e) => write!(f, "{}", e),
            TrackerError::Agent(e) => write!(f, "{}", e),
            TrackerError::Event(e) => write!(f, "{}", e),
            TrackerError::Challenge(e) => write!(f, "{}", e),
            TrackerError::Liquidation(e) => write!(f, "{}", e),
            TrackerError::NonPaymentMismatch => write!(f, "redemption non-payment mismatch"),
            TrackerError::DefaultTooEarly => write!(f, "redemption default too early"),
            TrackerError::ProofWindowTooShort => {
                write!(f, "redemption non-payment proof window too short")
            }
            TrackerError::Serialization(msg) => write!(f, "serialization failed: {}", msg),
            TrackerError::Snapshot(msg) => write!(f, "invalid snapshot: {}", msg),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<StateError> for TrackerError {
    fn from(e: StateError) -> Self {
        TrackerError::State(e)
    }
}

impl From<AgentError> for TrackerError {
    fn from(e: AgentError) -> Self {
        TrackerError::Agent(e)
    }
}

impl From<EventError> for TrackerError {
    fn from(e: EventError) -> Self {
        TrackerError::Event(e)
    }
}

impl From<ChallengeError> for TrackerError {
    fn from(e: ChallengeError) -> Self {
        TrackerError::Challenge(e)
    }
}

impl From<LiquidationError> for TrackerError {
    fn from(e: LiquidationError) -> Self {
        TrackerError::Liquidation(e)
    }
}

/// Collateral paid to the redeemer on a defaulted redemption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedemptionDefaultOutcome {
    pub paid_class1_wei: u128,
    pub paid_pool_wei: u128,
}

/// Result of one liquidation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquidationOutcome {
    /// F-assets actually burned, after clamping to minted backing
    pub liquidated_uba: u128,
    /// Class-1 collateral paid to the liquidator
    pub paid_class1_wei: u128,
    /// Pool collateral paid to the liquidator
    pub paid_pool_wei: u128,
}

/// Headline figures for one agent, for display and the FFI layer.
///
/// The ratios are `f64` for readability only; every authoritative comparison
/// inside the ledger uses BIPS integers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInfo {
    pub vault: String,
    pub status: AgentStatus,
    pub minted_uba: u128,
    pub reserved_uba: u128,
    pub redeeming_uba: u128,
    pub dust_uba: u128,
    pub underlying_balance_uba: i128,
    pub free_underlying_balance_uba: i128,
    pub class1_collateral_wei: u128,
    pub pool_collateral_wei: u128,
    pub class1_collateral_ratio: f64,
    pub pool_collateral_ratio: f64,
}

fn display_ratio(ratio_bips: u128) -> f64 {
    if ratio_bips == u128::MAX {
        f64::INFINITY
    } else {
        ratio_bips as f64 / MAX_BIPS as f64
    }
}

/// The complete ledger: agents, context, clock and fact log.
///
/// # Example
///
/// ```rust
/// use fasset_ledger_core_rs::core::units::{PriceQuote, PRICE_SCALE};
/// use fasset_ledger_core_rs::events::ChainEvent;
/// use fasset_ledger_core_rs::models::{LedgerContext, LedgerSettings};
/// use fasset_ledger_core_rs::tracker::LedgerTracker;
///
/// let context = LedgerContext::new(
///     LedgerSettings::default(),
///     PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
///     PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
/// );
/// let mut tracker = LedgerTracker::new(context);
/// tracker
///     .apply_event(&ChainEvent::AgentCreated {
///         agent_vault: "vault_1".to_string(),
///         owner: "owner_1".to_string(),
///         underlying_address: "UNDERLYING_1".to_string(),
///     })
///     .unwrap();
/// assert_eq!(tracker.state().num_agents(), 1);
/// assert!(tracker.check_invariants().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LedgerTracker {
    state: LedgerState,
    context: LedgerContext,
    facts: FactLog,
    now: u64,
}

impl LedgerTracker {
    /// Create an empty tracker with the clock at zero.
    pub fn new(context: LedgerContext) -> Self {
        Self {
            state: LedgerState::new(),
            context,
            facts: FactLog::new(),
            now: 0,
        }
    }

    // ========================================================================
    // Clock, prices and access
    // ========================================================================

    /// Current ledger timestamp.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Move the ledger clock forward.
    pub fn advance_time(&mut self, seconds: u64) {
        self.now += seconds;
    }

    /// Install fresh oracle quotes. Status consequences are not evaluated
    /// here; callers drive them through [`Self::start_liquidation`].
    pub fn update_prices(&mut self, class1_price: PriceQuote, pool_price: PriceQuote) {
        self.context.class1_price = class1_price;
        self.context.pool_price = pool_price;
    }

    pub fn context(&self) -> &LedgerContext {
        &self.context
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn agent(&self, agent_vault: &str) -> Result<&AgentLedger, TrackerError> {
        Ok(self.state.agent(agent_vault)?)
    }

    /// Headline figures for one agent, ratios included.
    pub fn agent_info(&self, agent_vault: &str) -> Result<AgentInfo, TrackerError> {
        let agent = self.state.agent(agent_vault)?;
        Ok(AgentInfo {
            vault: agent.vault().to_string(),
            status: agent.status(),
            minted_uba: agent.minted_uba(),
            reserved_uba: agent.reserved_uba(),
            redeeming_uba: agent.redeeming_uba(),
            dust_uba: agent.dust_uba(),
            underlying_balance_uba: agent.underlying_balance_uba(),
            free_underlying_balance_uba: agent.free_underlying_balance_uba(),
            class1_collateral_wei: agent.collateral_wei(CollateralClass::Class1),
            pool_collateral_wei: agent.collateral_wei(CollateralClass::Pool),
            class1_collateral_ratio: display_ratio(liquidation::class1_ratio_bips(
                agent,
                &self.context,
            )),
            pool_collateral_ratio: display_ratio(liquidation::pool_ratio_bips(
                agent,
                &self.context,
            )),
        })
    }

    /// Facts derived so far, in order.
    pub fn facts(&self) -> &FactLog {
        &self.facts
    }

    /// Drain the fact log, handing the facts to the caller.
    pub fn take_facts(&mut self) -> Vec<LedgerFact> {
        self.facts.take()
    }

    // ========================================================================
    // Event intake
    // ========================================================================

    /// Apply one chain event to the ledger.
    pub fn apply_event(&mut self, event: &ChainEvent) -> Result<(), TrackerError> {
        event.apply(&mut self.state, &self.context, &mut self.facts, self.now)?;
        Ok(())
    }

    // ========================================================================
    // Redemption default
    // ========================================================================

    /// Default a redemption against a non-existence proof.
    ///
    /// The proof must match the request's reference, destination and payment
    /// amount; its window must cover the whole payment window and end past
    /// the request's deadline on both the block and the timestamp axis. On
    /// success the collateral side of the request releases and the redeemer
    /// is compensated from both collaterals at the default factors.
    pub fn default_redemption(
        &mut self,
        agent_vault: &str,
        request_id: u64,
        proof: &NonExistencePaymentProof,
    ) -> Result<RedemptionDefaultOutcome, TrackerError> {
        let agent = self.state.agent(agent_vault)?;
        let request = agent
            .redemption(request_id)
            .ok_or(AgentError::UnknownRedemption { id: request_id })?;
        if request.collateral_released() {
            return Err(TrackerError::Agent(RedemptionError::InvalidStatus.into()));
        }
        if proof.payment_reference != request.payment_reference()
            || proof.destination_address != request.payment_address()
            || proof.amount_uba != request.payment_value_uba()
        {
            return Err(TrackerError::NonPaymentMismatch);
        }
        if proof.last_block <= request.last_underlying_block()
            || proof.last_block_timestamp <= request.last_underlying_timestamp()
        {
            return Err(TrackerError::DefaultTooEarly);
        }
        if proof.first_block > request.first_underlying_block() {
            return Err(TrackerError::ProofWindowTooShort);
        }

        let settings = &self.context.settings;
        let value_amg = settings.uba_to_amg(request.value_uba());
        let class1_wei = self.context.class1_price.convert_amg_to_token(mul_bips(
            value_amg,
            u128::from(settings.redemption_default_factor_class1_bips),
        ));
        let pool_wei = self.context.pool_price.convert_amg_to_token(mul_bips(
            value_amg,
            u128::from(settings.redemption_default_factor_pool_bips),
        ));

        let agent = self.state.agent_mut(agent_vault)?;
        let (_, removed) = agent.default_redemption(request_id)?;
        let paid_class1_wei = agent.pay_out_collateral(CollateralClass::Class1, class1_wei);
        let paid_pool_wei = agent.pay_out_collateral(CollateralClass::Pool, pool_wei);

        self.facts.log(LedgerFact::RedemptionDefaulted {
            timestamp: self.now,
            agent_vault: agent_vault.to_string(),
            request_id,
            paid_class1_wei,
            paid_pool_wei,
        });
        if removed {
            self.facts.log(LedgerFact::RedemptionClosed {
                timestamp: self.now,
                agent_vault: agent_vault.to_string(),
                request_id,
            });
        }
        Ok(RedemptionDefaultOutcome {
            paid_class1_wei,
            paid_pool_wei,
        })
    }

    // ========================================================================
    // Challenges
    // ========================================================================

    /// Challenge a payment justified by no redemption and no announced
    /// withdrawal. Returns the reward paid to the challenger.
    pub fn illegal_payment_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        proof: &PaymentProof,
    ) -> Result<u128, TrackerError> {
        let agent = self.state.agent(agent_vault)?;
        challenges::verify_illegal_payment(agent, proof)?;
        self.confirm_challenge(agent_vault, challenger, ChallengeKind::IllegalPayment)
    }

    /// Challenge two payments carrying the same reference.
    pub fn double_payment_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        proof1: &PaymentProof,
        proof2: &PaymentProof,
    ) -> Result<u128, TrackerError> {
        let agent = self.state.agent(agent_vault)?;
        challenges::verify_double_payment(agent, proof1, proof2)?;
        self.confirm_challenge(agent_vault, challenger, ChallengeKind::DoublePayment)
    }

    /// Challenge a set of payments that together overdraw the agent's free
    /// underlying balance.
    pub fn free_balance_negative_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        proofs: &[PaymentProof],
    ) -> Result<u128, TrackerError> {
        let agent = self.state.agent(agent_vault)?;
        challenges::verify_free_balance_negative(agent, proofs)?;
        self.confirm_challenge(agent_vault, challenger, ChallengeKind::FreeBalanceNegative)
    }

    /// Consequences shared by all confirmed challenges: full liquidation and
    /// the challenger reward, clamped to the agent's class-1 collateral.
    fn confirm_challenge(
        &mut self,
        agent_vault: &str,
        challenger: &str,
        kind: ChallengeKind,
    ) -> Result<u128, TrackerError> {
        let now = self.now;
        let agent = self.state.agent_mut(agent_vault)?;
        let reward_wei = challenges::challenger_reward_wei(agent, &self.context);
        agent.start_full_liquidation(now);
        let paid_wei = agent.pay_out_collateral(CollateralClass::Class1, reward_wei);

        self.facts.log(LedgerFact::ChallengeConfirmed {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            challenger: challenger.to_string(),
            kind,
            rewarded_class1_wei: paid_wei,
        });
        self.facts.log(LedgerFact::StatusChanged {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            status: AgentStatus::FullLiquidation,
        });
        Ok(paid_wei)
    }

    // ========================================================================
    // Liquidation
    // ========================================================================

    /// Evaluate the agent's collateral ratios and advance the status machine.
    /// Returns the transition performed, `None` when nothing changed.
    pub fn start_liquidation(
        &mut self,
        agent_vault: &str,
    ) -> Result<Option<(AgentStatus, AgentStatus)>, TrackerError> {
        let now = self.now;
        let agent = self.state.agent_mut(agent_vault)?;
        let transition = liquidation::update_liquidation_status(agent, &self.context, now);
        if let Some((_, to)) = transition {
            self.facts.log(LedgerFact::StatusChanged {
                timestamp: now,
                agent_vault: agent_vault.to_string(),
                status: to,
            });
        }
        Ok(transition)
    }

    /// Leave the call band or liquidation once both ratios are safe again.
    pub fn end_liquidation(&mut self, agent_vault: &str) -> Result<(), TrackerError> {
        let agent = self.state.agent_mut(agent_vault)?;
        liquidation::end_liquidation(agent, &self.context)?;
        self.facts.log(LedgerFact::StatusChanged {
            timestamp: self.now,
            agent_vault: agent_vault.to_string(),
            status: AgentStatus::Normal,
        });
        Ok(())
    }

    /// Burn f-assets against a liquidating agent and pay the liquidator the
    /// stepped premium.
    ///
    /// Requires an active liquidation; a healthy agent is never liquidated
    /// as a side effect. The amount clamps to the minted backing, and both
    /// rewards clamp to the collateral the agent still holds.
    pub fn liquidate(
        &mut self,
        agent_vault: &str,
        liquidator: &str,
        amount_uba: u128,
    ) -> Result<LiquidationOutcome, TrackerError> {
        let now = self.now;
        let agent = self.state.agent(agent_vault)?;
        if !matches!(
            agent.status(),
            AgentStatus::Liquidation | AgentStatus::FullLiquidation
        ) {
            return Err(TrackerError::Liquidation(LiquidationError::NotInLiquidation));
        }
        let amount_uba = amount_uba.min(agent.minted_uba());
        if amount_uba == 0 {
            return Ok(LiquidationOutcome::default());
        }

        // premium factors come from the pre-liquidation ratio
        let settings = &self.context.settings;
        let step = liquidation::liquidation_step(now, agent.liquidation_start_timestamp(), settings);
        let factors = liquidation::liquidation_factors(
            step,
            liquidation::class1_ratio_bips(agent, &self.context),
            settings,
        );
        let liquidated_amg = settings.uba_to_amg(amount_uba);
        let (class1_wei, pool_wei) =
            liquidation::liquidation_rewards(liquidated_amg, &factors, &self.context);

        let agent = self.state.agent_mut(agent_vault)?;
        let dust_before = agent.dust_uba();
        let outcome = agent.close_backing(amount_uba, &self.context.settings)?;
        let paid_class1_wei = agent.pay_out_collateral(CollateralClass::Class1, class1_wei);
        let paid_pool_wei = agent.pay_out_collateral(CollateralClass::Pool, pool_wei);
        let dust_after = agent.dust_uba();

        log_ticket_changes(&mut self.facts, now, agent_vault, &outcome.changes);
        log_dust_if_changed(&mut self.facts, now, agent_vault, dust_before, dust_after);
        self.facts.log(LedgerFact::LiquidationPerformed {
            timestamp: now,
            agent_vault: agent_vault.to_string(),
            liquidator: liquidator.to_string(),
            liquidated_uba: amount_uba,
            paid_class1_wei,
            paid_pool_wei,
        });
        Ok(LiquidationOutcome {
            liquidated_uba: amount_uba,
            paid_class1_wei,
            paid_pool_wei,
        })
    }

    // ========================================================================
    // Wind-down
    // ========================================================================

    /// Announce the agent's wind-down. Requires that it backs nothing; the
    /// later AgentDestroyed event removes it from the ledger.
    pub fn announce_destroy(&mut self, agent_vault: &str) -> Result<(), TrackerError> {
        let agent = self.state.agent_mut(agent_vault)?;
        agent.announce_destroy()?;
        self.facts.log(LedgerFact::StatusChanged {
            timestamp: self.now,
            agent_vault: agent_vault.to_string(),
            status: AgentStatus::Destroying,
        });
        Ok(())
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Cross-check every agent's running totals against its books.
    pub fn check_invariants(&self) -> Vec<String> {
        self.state.check_invariants(&self.context.settings)
    }

    /// Audit one agent's accounted backing against its real underlying
    /// holding, as reported by the caller.
    pub fn check_underlying_backing(
        &self,
        agent_vault: &str,
        chain_balance_uba: u128,
    ) -> Result<Vec<String>, TrackerError> {
        Ok(self
            .state
            .agent(agent_vault)?
            .check_underlying_backing(chain_balance_uba))
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Capture the complete tracker state, agents sorted by vault so the
    /// same ledger always snapshots identically.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, TrackerError> {
        let mut agents: Vec<AgentSnapshot> =
            self.state.agents().map(AgentSnapshot::from).collect();
        agents.sort_by(|a, b| a.vault.cmp(&b.vault));
        Ok(LedgerSnapshot {
            now: self.now,
            settings_hash: compute_settings_hash(&self.context.settings)?,
            class1_price: self.context.class1_price,
            pool_price: self.context.pool_price,
            agents,
        })
    }

    /// Rebuild a tracker from a snapshot taken with the same settings.
    ///
    /// The snapshot is validated first. Prices come from the snapshot; the
    /// fact log starts empty because facts describe changes, not state.
    pub fn restore(
        snapshot: LedgerSnapshot,
        settings: crate::models::LedgerSettings,
    ) -> Result<Self, TrackerError> {
        validate_snapshot(&snapshot, &settings)?;
        let context = LedgerContext::new(settings, snapshot.class1_price, snapshot.pool_price);
        let now = snapshot.now;
        let mut state = LedgerState::new();
        for agent in snapshot.agents {
            state.register_agent(agent.into())?;
        }
        Ok(Self {
            state,
            context,
            facts: FactLog::new(),
            now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference;
    use crate::core::units::PRICE_SCALE;
    use crate::models::LedgerSettings;

    const VAULT: &str = "vault_1";
    const UNDERLYING: &str = "UNDERLYING_1";

    fn tracker() -> LedgerTracker {
        let context = LedgerContext::new(
            LedgerSettings::default(),
            PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
            PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
        );
        LedgerTracker::new(context)
    }

    fn create_agent(tracker: &mut LedgerTracker) {
        tracker
            .apply_event(&ChainEvent::AgentCreated {
                agent_vault: VAULT.to_string(),
                owner: "owner_1".to_string(),
                underlying_address: UNDERLYING.to_string(),
            })
            .unwrap();
    }

    fn deposit_collateral(tracker: &mut LedgerTracker, class1_wei: u128, pool_wei: u128) {
        tracker
            .apply_event(&ChainEvent::CollateralDeposited {
                agent_vault: VAULT.to_string(),
                collateral: CollateralClass::Class1,
                amount_wei: class1_wei,
            })
            .unwrap();
        tracker
            .apply_event(&ChainEvent::CollateralDeposited {
                agent_vault: VAULT.to_string(),
                collateral: CollateralClass::Pool,
                amount_wei: pool_wei,
            })
            .unwrap();
    }

    fn self_mint(tracker: &mut LedgerTracker, ticket_id: u64, minted_uba: u128, agent_fee: u128) {
        tracker
            .apply_event(&ChainEvent::MintingExecuted {
                agent_vault: VAULT.to_string(),
                reservation_id: 0,
                redemption_ticket_id: ticket_id,
                minted_uba,
                agent_fee_uba: agent_fee,
                pool_fee_uba: 0,
            })
            .unwrap();
    }

    fn open_redemption(tracker: &mut LedgerTracker, request_id: u64, value_uba: u128) {
        tracker
            .apply_event(&ChainEvent::RedemptionRequested {
                agent_vault: VAULT.to_string(),
                request_id,
                redeemer: "redeemer_1".to_string(),
                value_uba,
                fee_uba: value_uba / 100,
                first_underlying_block: 10,
                last_underlying_block: 100,
                last_underlying_timestamp: 10_000,
                payment_address: "UNDERLYING_REDEEMER".to_string(),
                payment_reference: reference::redemption(request_id),
                pool_self_close: false,
            })
            .unwrap();
    }

    fn nonpayment_proof(request_id: u64, amount_uba: u128) -> NonExistencePaymentProof {
        NonExistencePaymentProof {
            payment_reference: reference::redemption(request_id),
            destination_address: "UNDERLYING_REDEEMER".to_string(),
            amount_uba,
            first_block: 10,
            last_block: 101,
            last_block_timestamp: 10_001,
        }
    }

    // ========================================================================
    // Event intake and clock
    // ========================================================================

    #[test]
    fn test_facts_carry_the_ledger_clock() {
        let mut t = tracker();
        create_agent(&mut t);
        t.advance_time(500);
        t.apply_event(&ChainEvent::UnderlyingTopup {
            agent_vault: VAULT.to_string(),
            amount_uba: 1_000,
        })
        .unwrap();

        let facts = t.take_facts();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].timestamp(), 0);
        assert_eq!(facts[1].timestamp(), 500);
        assert!(t.facts().is_empty());
    }

    #[test]
    fn test_apply_event_surfaces_unknown_agent() {
        let mut t = tracker();
        let err = t
            .apply_event(&ChainEvent::UnderlyingTopup {
                agent_vault: "nobody".to_string(),
                amount_uba: 1,
            })
            .unwrap_err();
        assert_eq!(
            err,
            TrackerError::Event(EventError::State(StateError::UnknownAgent {
                vault: "nobody".to_string()
            }))
        );
    }

    // ========================================================================
    // Redemption default
    // ========================================================================

    #[test]
    fn test_default_redemption_pays_both_collaterals() {
        let mut t = tracker();
        create_agent(&mut t);
        deposit_collateral(&mut t, 1_000_000, 1_000_000);
        self_mint(&mut t, 1, 40_000, 0);
        open_redemption(&mut t, 1, 20_000);

        // 20_000 UBA = 200 AMG; factors 110% class-1 and 10% pool at price 1
        let outcome = t
            .default_redemption(VAULT, 1, &nonpayment_proof(1, 20_000 - 200))
            .unwrap();
        assert_eq!(outcome.paid_class1_wei, 220);
        assert_eq!(outcome.paid_pool_wei, 20);

        let agent = t.agent(VAULT).unwrap();
        assert_eq!(agent.redeeming_uba(), 0);
        assert_eq!(agent.collateral_wei(CollateralClass::Class1), 1_000_000 - 220);
        assert_eq!(agent.collateral_wei(CollateralClass::Pool), 1_000_000 - 20);
        // underlying side still owed, so the request stays
        assert!(agent.redemption(1).is_some());
        assert_eq!(t.facts().facts_of_type("redemption_defaulted").len(), 1);
        assert!(t.facts().facts_of_type("redemption_closed").is_empty());
        assert!(t.check_invariants().is_empty());
    }

    #[test]
    fn test_default_redemption_checks_in_order() {
        let mut t = tracker();
        create_agent(&mut t);
        deposit_collateral(&mut t, 1_000_000, 1_000_000);
        self_mint(&mut t, 1, 40_000, 0);
        open_redemption(&mut t, 1, 20_000);
        let payment_value = 20_000 - 200;

        // a proof that is both mismatched and too early fails on the mismatch
        let mut proof = nonpayment_proof(1, payment_value + 1);
        proof.last_block = 100;
        assert_eq!(
            t.default_redemption(VAULT, 1, &proof),
            Err(TrackerError::NonPaymentMismatch)
        );

        // matching but not past the deadline on both axes
        let mut proof = nonpayment_proof(1, payment_value);
        proof.last_block = 100;
        assert_eq!(
            t.default_redemption(VAULT, 1, &proof),
            Err(TrackerError::DefaultTooEarly)
        );
        let mut proof = nonpayment_proof(1, payment_value);
        proof.last_block_timestamp = 10_000;
        assert_eq!(
            t.default_redemption(VAULT, 1, &proof),
            Err(TrackerError::DefaultTooEarly)
        );

        // window starts after the payment window opened
        let mut proof = nonpayment_proof(1, payment_value);
        proof.first_block = 11;
        assert_eq!(
            t.default_redemption(VAULT, 1, &proof),
            Err(TrackerError::ProofWindowTooShort)
        );

        // a valid proof defaults, a second default is rejected
        t.default_redemption(VAULT, 1, &nonpayment_proof(1, payment_value))
            .unwrap();
        assert_eq!(
            t.default_redemption(VAULT, 1, &nonpayment_proof(1, payment_value)),
            Err(TrackerError::Agent(RedemptionError::InvalidStatus.into()))
        );
    }

    #[test]
    fn test_default_redemption_unknown_request() {
        let mut t = tracker();
        create_agent(&mut t);
        assert_eq!(
            t.default_redemption(VAULT, 9, &nonpayment_proof(9, 100)),
            Err(TrackerError::Agent(AgentError::UnknownRedemption { id: 9 }))
        );
    }

    // ========================================================================
    // Challenges
    // ========================================================================

    #[test]
    fn test_illegal_payment_challenge_consequences() {
        let mut t = tracker();
        create_agent(&mut t);
        deposit_collateral(&mut t, 10_000, 10_000);
        self_mint(&mut t, 1, 20_000, 1_000);
        t.advance_time(800);

        let proof = PaymentProof {
            tx_hash: "0xtx1".to_string(),
            source_address: UNDERLYING.to_string(),
            target_address: "SOMEWHERE".to_string(),
            payment_reference: String::new(),
            spent_uba: 500,
            received_uba: 500,
            block_number: 5,
            block_timestamp: 50,
        };
        // 200 AMG backed at 3% = 6 wei, plus the flat 300 USD5 = 306
        let reward = t
            .illegal_payment_challenge(VAULT, "challenger_1", &proof)
            .unwrap();
        assert_eq!(reward, 306);

        let agent = t.agent(VAULT).unwrap();
        assert_eq!(agent.status(), AgentStatus::FullLiquidation);
        assert_eq!(agent.liquidation_start_timestamp(), 800);
        assert_eq!(agent.ccb_start_timestamp(), 0);
        assert_eq!(agent.collateral_wei(CollateralClass::Class1), 10_000 - 306);
        // the challenge burns nothing by itself
        assert_eq!(agent.minted_uba(), 20_000);

        assert_eq!(t.facts().facts_of_type("challenge_confirmed").len(), 1);
        assert_eq!(t.facts().facts_of_type("status_changed").len(), 1);

        // no second bite at the same agent
        assert_eq!(
            t.illegal_payment_challenge(VAULT, "challenger_2", &proof),
            Err(TrackerError::Challenge(ChallengeError::AlreadyLiquidating))
        );
    }

    #[test]
    fn test_challenge_reward_clamps_to_collateral() {
        let mut t = tracker();
        create_agent(&mut t);
        deposit_collateral(&mut t, 100, 0);
        self_mint(&mut t, 1, 20_000, 0);

        let proof = PaymentProof {
            tx_hash: "0xtx1".to_string(),
            source_address: UNDERLYING.to_string(),
            target_address: "SOMEWHERE".to_string(),
            payment_reference: String::new(),
            spent_uba: 1,
            received_uba: 1,
            block_number: 5,
            block_timestamp: 50,
        };
        let reward = t
            .illegal_payment_challenge(VAULT, "challenger_1", &proof)
            .unwrap();
        assert_eq!(reward, 100);
        let agent = t.agent(VAULT).unwrap();
        assert_eq!(agent.collateral_wei(CollateralClass::Class1), 0);
    }

    // ========================================================================
    // Liquidation
    // ========================================================================

    /// Agent backing 10_000 AMG whose class-1 ratio sits below the band.
    fn liquidatable_tracker(class1_wei: u128, pool_wei: u128) -> LedgerTracker {
        let mut t = tracker();
        create_agent(&mut t);
        deposit_collateral(&mut t, class1_wei, pool_wei);
        self_mint(&mut t, 1, 1_000_000, 0);
        t
    }

    #[test]
    fn test_liquidate_requires_active_liquidation() {
        let mut t = liquidatable_tracker(20_000, 20_000);
        assert_eq!(
            t.liquidate(VAULT, "liquidator_1", 10_000),
            Err(TrackerError::Liquidation(LiquidationError::NotInLiquidation))
        );
    }

    #[test]
    fn test_start_liquidation_logs_transition() {
        let mut t = liquidatable_tracker(12_000, 20_000);
        t.advance_time(1_000);

        let transition = t.start_liquidation(VAULT).unwrap();
        assert_eq!(
            transition,
            Some((AgentStatus::Normal, AgentStatus::Liquidation))
        );
        assert_eq!(t.facts().facts_of_type("status_changed").len(), 1);

        // evaluating again changes nothing and logs nothing
        assert_eq!(t.start_liquidation(VAULT).unwrap(), None);
        assert_eq!(t.facts().facts_of_type("status_changed").len(), 1);
    }

    #[test]
    fn test_liquidate_pays_premium_and_burns_backing() {
        let mut t = liquidatable_tracker(12_000, 20_000);
        t.advance_time(1_000);
        t.start_liquidation(VAULT).unwrap();

        // step 1: total factor 120%, class-1 takes all of it
        let outcome = t.liquidate(VAULT, "liquidator_1", 100_000).unwrap();
        assert_eq!(outcome.liquidated_uba, 100_000);
        assert_eq!(outcome.paid_class1_wei, 1_200);
        assert_eq!(outcome.paid_pool_wei, 0);

        let agent = t.agent(VAULT).unwrap();
        assert_eq!(agent.minted_uba(), 900_000);
        assert_eq!(agent.collateral_wei(CollateralClass::Class1), 10_800);
        assert_eq!(t.facts().facts_of_type("liquidation_performed").len(), 1);
        assert!(t.check_invariants().is_empty());
    }

    #[test]
    fn test_liquidate_clamps_to_minted_backing() {
        let mut t = liquidatable_tracker(12_000, 20_000);
        t.start_liquidation(VAULT).unwrap();

        let outcome = t.liquidate(VAULT, "liquidator_1", 2_000_000).unwrap();
        assert_eq!(outcome.liquidated_uba, 1_000_000);
        assert_eq!(t.agent(VAULT).unwrap().minted_uba(), 0);
    }

    #[test]
    fn test_end_liquidation_after_recovery() {
        let mut t = liquidatable_tracker(12_000, 20_000);
        t.start_liquidation(VAULT).unwrap();

        assert_eq!(
            t.end_liquidation(VAULT),
            Err(TrackerError::Liquidation(
                LiquidationError::CannotStopLiquidation
            ))
        );

        deposit_collateral(&mut t, 3_000, 0);
        t.end_liquidation(VAULT).unwrap();
        assert_eq!(t.agent(VAULT).unwrap().status(), AgentStatus::Normal);
    }

    // ========================================================================
    // Wind-down and audit
    // ========================================================================

    #[test]
    fn test_announce_destroy_requires_no_backing() {
        let mut t = tracker();
        create_agent(&mut t);
        self_mint(&mut t, 1, 20_000, 0);

        assert_eq!(
            t.announce_destroy(VAULT),
            Err(TrackerError::Agent(AgentError::StillBackingFAssets))
        );

        t.apply_event(&ChainEvent::SelfClose {
            agent_vault: VAULT.to_string(),
            value_uba: 20_000,
        })
        .unwrap();
        t.announce_destroy(VAULT).unwrap();

        t.apply_event(&ChainEvent::AgentDestroyed {
            agent_vault: VAULT.to_string(),
        })
        .unwrap();
        assert_eq!(t.state().num_agents(), 0);
    }

    #[test]
    fn test_underlying_backing_audit() {
        let mut t = tracker();
        create_agent(&mut t);
        self_mint(&mut t, 1, 20_000, 1_000);

        // accounted deposit is 21_000: minted 20_000 plus 1_000 free
        assert!(t.check_underlying_backing(VAULT, 21_000).unwrap().is_empty());
        assert_eq!(t.check_underlying_backing(VAULT, 20_999).unwrap().len(), 1);
    }

    #[test]
    fn test_agent_info_reports_ratios() {
        let mut t = liquidatable_tracker(15_000, 30_000);
        let info = t.agent_info(VAULT).unwrap();
        assert_eq!(info.minted_uba, 1_000_000);
        assert!((info.class1_collateral_ratio - 1.5).abs() < 1e-9);
        assert!((info.pool_collateral_ratio - 3.0).abs() < 1e-9);

        // an agent backing nothing is infinitely collateralized
        t.apply_event(&ChainEvent::SelfClose {
            agent_vault: VAULT.to_string(),
            value_uba: 1_000_000,
        })
        .unwrap();
        let info = t.agent_info(VAULT).unwrap();
        assert!(info.class1_collateral_ratio.is_infinite());
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut t = liquidatable_tracker(12_000, 20_000);
        t.advance_time(1_000);
        t.start_liquidation(VAULT).unwrap();
        t.liquidate(VAULT, "liquidator_1", 30_000).unwrap();

        let snapshot = t.snapshot().unwrap();
        let restored =
            LedgerTracker::restore(snapshot, t.context().settings.clone()).unwrap();

        assert_eq!(restored.now(), 1_000);
        assert_eq!(
            restored.agent(VAULT).unwrap().minted_uba(),
            t.agent(VAULT).unwrap().minted_uba()
        );
        assert_eq!(
            restored.agent(VAULT).unwrap().status(),
            AgentStatus::Liquidation
        );
        // restored trackers start with an empty fact log
        assert!(restored.facts().is_empty());
        assert!(restored.check_invariants().is_empty());
    }

    #[test]
    fn test_restore_rejects_different_settings() {
        let t = liquidatable_tracker(20_000, 20_000);
        let snapshot = t.snapshot().unwrap();

        let mut other = t.context().settings.clone();
        other.lot_size_amg = 500;
        let err = LedgerTracker::restore(snapshot, other).unwrap_err();
        assert!(matches!(err, TrackerError::Snapshot(_)));
    }
}

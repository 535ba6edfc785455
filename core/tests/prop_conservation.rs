//! Property tests for backing conservation
//!
//! Drives one agent through random sequences of mintings, self-closes,
//! redemptions and pool entries, and checks after every step that the books
//! still balance: running totals agree with the ticket book, the underlying
//! free balance never goes negative and the pool's fee debt stays covered.

use proptest::prelude::*;

use fasset_ledger_core_rs::core::reference;
use fasset_ledger_core_rs::models::RedemptionPaymentKind;
use fasset_ledger_core_rs::{
    ChainEvent, CollateralClass, LedgerContext, LedgerSettings, LedgerTracker, PriceQuote,
    PRICE_SCALE,
};

const VAULT: &str = "0xvault_1";
const UNDERLYING: &str = "UNDERLYING_AGENT_1";
const LOT: u128 = 10_000;

/// One randomly generated ledger operation.
#[derive(Debug, Clone)]
enum Op {
    Mint { lots: u128, fee_uba: u128 },
    SelfClose { pct: u128 },
    Redeem { lots: u128 },
    ConfirmRedemption,
    Topup { amount_uba: u128 },
    PoolEnter { holder: u8, tokens: u128 },
    AdvanceTime { seconds: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u128..=5, 0u128..1_000).prop_map(|(lots, fee_uba)| Op::Mint { lots, fee_uba }),
        (1u128..=100).prop_map(|pct| Op::SelfClose { pct }),
        (1u128..=4).prop_map(|lots| Op::Redeem { lots }),
        Just(Op::ConfirmRedemption),
        (1u128..5_000).prop_map(|amount_uba| Op::Topup { amount_uba }),
        (0u8..3, 1u128..1_000).prop_map(|(holder, tokens)| Op::PoolEnter { holder, tokens }),
        (1u64..200).prop_map(|seconds| Op::AdvanceTime { seconds }),
    ]
}

fn fresh_tracker() -> LedgerTracker {
    let context = LedgerContext::new(
        LedgerSettings::default(),
        PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
        PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
    );
    let mut tracker = LedgerTracker::new(context);
    tracker
        .apply_event(&ChainEvent::AgentCreated {
            agent_vault: VAULT.to_string(),
            owner: "0xowner_1".to_string(),
            underlying_address: UNDERLYING.to_string(),
        })
        .unwrap();
    // enough collateral that no op sequence here can dent the ratio
    for collateral in [CollateralClass::Class1, CollateralClass::Pool] {
        tracker
            .apply_event(&ChainEvent::CollateralDeposited {
                agent_vault: VAULT.to_string(),
                collateral,
                amount_wei: 100_000_000_000,
            })
            .unwrap();
    }
    tracker
}

/// Tracks the ids handed out and the redemptions still open.
#[derive(Default)]
struct OpState {
    next_ticket_id: u64,
    next_request_id: u64,
    open_requests: Vec<(u64, u128)>,
}

/// Apply one op, skipping it when the ledger cannot take it (nothing minted
/// yet, no whole lots, no open redemption). Every event actually issued must
/// succeed.
fn apply_op(tracker: &mut LedgerTracker, ids: &mut OpState, op: &Op) {
    let settings = tracker.context().settings.clone();
    match op {
        Op::Mint { lots, fee_uba } => {
            ids.next_ticket_id += 1;
            let pool_fee_uba = settings.pool_fee_share(*fee_uba);
            tracker
                .apply_event(&ChainEvent::MintingExecuted {
                    agent_vault: VAULT.to_string(),
                    reservation_id: 0,
                    redemption_ticket_id: ids.next_ticket_id,
                    minted_uba: settings.lots_to_uba(*lots),
                    agent_fee_uba: *fee_uba - pool_fee_uba,
                    pool_fee_uba,
                })
                .unwrap();
        }
        Op::SelfClose { pct } => {
            let minted = tracker.agent(VAULT).unwrap().minted_uba();
            let amount_uba = minted * pct / 100;
            if amount_uba == 0 {
                return;
            }
            tracker
                .apply_event(&ChainEvent::SelfClose {
                    agent_vault: VAULT.to_string(),
                    value_uba: amount_uba,
                })
                .unwrap();
        }
        Op::Redeem { lots } => {
            let available = tracker
                .agent(VAULT)
                .unwrap()
                .ticket_book()
                .available_lots(LOT);
            let lots = (*lots).min(available);
            if lots == 0 {
                return;
            }
            ids.next_request_id += 1;
            let value_uba = settings.lots_to_uba(lots);
            tracker
                .apply_event(&ChainEvent::RedemptionRequested {
                    agent_vault: VAULT.to_string(),
                    request_id: ids.next_request_id,
                    redeemer: "0xredeemer_1".to_string(),
                    value_uba,
                    fee_uba: value_uba / 100,
                    first_underlying_block: 1,
                    last_underlying_block: 1_000,
                    last_underlying_timestamp: 1_000_000,
                    payment_address: "UNDERLYING_REDEEMER_1".to_string(),
                    payment_reference: reference::redemption(ids.next_request_id),
                    pool_self_close: false,
                })
                .unwrap();
            ids.open_requests.push((ids.next_request_id, value_uba));
        }
        Op::ConfirmRedemption => {
            let Some((request_id, value_uba)) = ids.open_requests.pop() else {
                return;
            };
            tracker
                .apply_event(&ChainEvent::RedemptionPaymentConfirmed {
                    agent_vault: VAULT.to_string(),
                    request_id,
                    kind: RedemptionPaymentKind::Performed,
                    spent_uba: value_uba,
                })
                .unwrap();
        }
        Op::Topup { amount_uba } => {
            tracker
                .apply_event(&ChainEvent::UnderlyingTopup {
                    agent_vault: VAULT.to_string(),
                    amount_uba: *amount_uba,
                })
                .unwrap();
        }
        Op::PoolEnter { holder, tokens } => {
            tracker
                .apply_event(&ChainEvent::PoolEnter {
                    agent_vault: VAULT.to_string(),
                    holder: format!("0xprovider_{}", holder),
                    tokens: *tokens,
                    paid_fees_uba: 0,
                })
                .unwrap();
        }
        Op::AdvanceTime { seconds } => {
            tracker.advance_time(*seconds);
        }
    }
}

proptest! {
    /// After every operation the running totals, the ticket book and the
    /// pool all agree with each other.
    #[test]
    fn books_balance_after_every_op(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut tracker = fresh_tracker();
        let mut ids = OpState::default();

        for op in &ops {
            apply_op(&mut tracker, &mut ids, op);

            let violations = tracker.check_invariants();
            prop_assert!(violations.is_empty(), "invariants broken: {:?}", violations);

            let agent = tracker.agent(VAULT).unwrap();
            prop_assert_eq!(agent.minted_uba(), agent.ticket_book().total_uba());
            prop_assert!(agent.dust_uba() < LOT, "dust {} >= one lot", agent.dust_uba());
            prop_assert!(
                agent.free_underlying_balance_uba() >= 0,
                "free balance {} negative",
                agent.free_underlying_balance_uba()
            );

            let pool = agent.pool();
            for holder in 0u8..3 {
                let holder = format!("0xprovider_{}", holder);
                prop_assert!(
                    pool.free_fees_of(&holder) >= 0,
                    "holder {} has negative free fees",
                    holder
                );
            }
            prop_assert!(pool.total_virtual_fees() >= pool.total_fee_debt());
        }

        // the open redemptions are exactly the redeeming total
        let open: u128 = ids.open_requests.iter().map(|(_, v)| v).sum();
        prop_assert_eq!(tracker.agent(VAULT).unwrap().redeeming_uba(), open);
    }

    /// The same operation sequence applied twice produces identical
    /// snapshots.
    #[test]
    fn replay_is_deterministic(ops in proptest::collection::vec(op_strategy(), 1..30)) {
        let mut first = fresh_tracker();
        let mut second = fresh_tracker();
        let mut first_ids = OpState::default();
        let mut second_ids = OpState::default();

        for op in &ops {
            apply_op(&mut first, &mut first_ids, op);
            apply_op(&mut second, &mut second_ids, op);
        }

        prop_assert_eq!(first.snapshot().unwrap(), second.snapshot().unwrap());
        prop_assert_eq!(first.take_facts(), second.take_facts());
    }

    /// A restore in the middle of a sequence does not change where the
    /// sequence ends up.
    #[test]
    fn restore_is_transparent(
        ops in proptest::collection::vec(op_strategy(), 2..30),
        split in 1usize..29,
    ) {
        let split = split.min(ops.len() - 1);
        let mut straight = fresh_tracker();
        let mut ids = OpState::default();
        for op in &ops {
            apply_op(&mut straight, &mut ids, op);
        }

        let mut front = fresh_tracker();
        let mut front_ids = OpState::default();
        for op in &ops[..split] {
            apply_op(&mut front, &mut front_ids, op);
        }
        let settings = front.context().settings.clone();
        let mut resumed = LedgerTracker::restore(front.snapshot().unwrap(), settings).unwrap();
        for op in &ops[split..] {
            apply_op(&mut resumed, &mut front_ids, op);
        }

        prop_assert_eq!(
            resumed.agent(VAULT).unwrap(),
            straight.agent(VAULT).unwrap()
        );
        prop_assert_eq!(resumed.now(), straight.now());
    }
}

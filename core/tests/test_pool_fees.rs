//! Integration tests for collateral pool share accounting
//!
//! Drives pool entries, exits, token transfers and fee withdrawals through
//! chain events and checks the fee debt bookkeeping that keeps late entrants
//! from claiming fees accrued before they joined.
//!
//! Critical invariants tested:
//! - Minting pool fees accrue to holders in proportion to their tokens
//! - A late entrant owes fee debt for the virtual fees its tokens bring in;
//!   paying fees in on entry cancels that debt
//! - Tokens locked by fee debt cannot be transferred
//! - Withdrawn fees convert into debt so virtual entitlements stay fixed
//! - Every pool operation reports the holder's position after the change

use fasset_ledger_core_rs::models::{LedgerFact, PoolError};
use fasset_ledger_core_rs::{
    ChainEvent, CollateralClass, EventError, LedgerContext, LedgerSettings, LedgerTracker,
    PriceQuote, TrackerError, PRICE_SCALE,
};

const VAULT: &str = "0xvault_1";

fn tracker() -> LedgerTracker {
    let context = LedgerContext::new(
        LedgerSettings::default(),
        PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
        PriceQuote::new(PRICE_SCALE, PRICE_SCALE),
    );
    let mut tracker = LedgerTracker::new(context);
    tracker.advance_time(1_000);
    tracker
        .apply_event(&ChainEvent::AgentCreated {
            agent_vault: VAULT.to_string(),
            owner: "0xowner_1".to_string(),
            underlying_address: "UNDERLYING_AGENT_1".to_string(),
        })
        .unwrap();
    for collateral in [CollateralClass::Class1, CollateralClass::Pool] {
        tracker
            .apply_event(&ChainEvent::CollateralDeposited {
                agent_vault: VAULT.to_string(),
                collateral,
                amount_wei: 50_000,
            })
            .unwrap();
    }
    tracker
}

fn enter(tracker: &mut LedgerTracker, holder: &str, tokens: u128, paid_fees_uba: u128) {
    tracker
        .apply_event(&ChainEvent::PoolEnter {
            agent_vault: VAULT.to_string(),
            holder: holder.to_string(),
            tokens,
            paid_fees_uba,
        })
        .unwrap();
}

/// Self-mint whose pool fee credits the agent's pool.
fn mint_with_pool_fee(tracker: &mut LedgerTracker, pool_fee_uba: u128) {
    tracker
        .apply_event(&ChainEvent::MintingExecuted {
            agent_vault: VAULT.to_string(),
            reservation_id: 0,
            redemption_ticket_id: 1,
            minted_uba: 20_000,
            agent_fee_uba: 600,
            pool_fee_uba,
        })
        .unwrap();
}

// ============================================================================
// Entries and fee accrual
// ============================================================================

#[test]
fn test_pool_entry_tracks_tokens() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.balance_of("0xalice"), 1_000);
    assert_eq!(pool.debt_of("0xalice"), 0);
    assert_eq!(pool.total_tokens(), 1_000);

    let positions = t.facts().facts_of_type("pool_position_changed");
    assert_eq!(positions.len(), 1);
    assert!(matches!(
        positions[0],
        LedgerFact::PoolPositionChanged {
            token_balance: 1_000,
            fee_debt_uba: 0,
            ..
        }
    ));
}

#[test]
fn test_minting_fees_accrue_to_pool_holders() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);
    mint_with_pool_fee(&mut t, 400);

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.total_fees_uba(), 400);
    assert_eq!(pool.virtual_fees_of("0xalice"), 400);
    assert_eq!(pool.free_fees_of("0xalice"), 400);
    assert!(t.check_invariants().is_empty());
}

#[test]
fn test_late_entrant_carries_fee_debt() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);
    mint_with_pool_fee(&mut t, 400);

    // bob doubles the pool without paying in: his tokens would claim half
    // of the 800 virtual fees, so he owes that half as debt
    enter(&mut t, "0xbob", 1_000, 0);

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.debt_of("0xbob"), 400);
    assert_eq!(pool.free_fees_of("0xbob"), 0);
    assert_eq!(pool.free_fees_of("0xalice"), 400, "alice keeps her share");

    let positions = t.facts().facts_of_type("pool_position_changed");
    assert!(matches!(
        positions.last().unwrap(),
        LedgerFact::PoolPositionChanged {
            token_balance: 1_000,
            fee_debt_uba: 400,
            ..
        }
    ));
}

#[test]
fn test_entrant_paying_fees_in_owes_nothing() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);
    mint_with_pool_fee(&mut t, 400);

    enter(&mut t, "0xbob", 1_000, 400);

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.debt_of("0xbob"), 0);
    assert_eq!(pool.free_fees_of("0xbob"), 400);
    assert_eq!(pool.free_fees_of("0xalice"), 400);
    assert_eq!(pool.total_fees_uba(), 800);
}

// ============================================================================
// Exits
// ============================================================================

#[test]
fn test_exit_returns_tokens_and_fees() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);
    mint_with_pool_fee(&mut t, 400);

    t.apply_event(&ChainEvent::PoolExit {
        agent_vault: VAULT.to_string(),
        holder: "0xalice".to_string(),
        burned_tokens: 1_000,
        received_fees_uba: 400,
    })
    .unwrap();

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.balance_of("0xalice"), 0);
    assert_eq!(pool.debt_of("0xalice"), 0);
    assert_eq!(pool.total_fees_uba(), 0);
    assert_eq!(pool.total_tokens(), 0);

    // nothing left to burn
    let err = t
        .apply_event(&ChainEvent::PoolExit {
            agent_vault: VAULT.to_string(),
            holder: "0xalice".to_string(),
            burned_tokens: 500,
            received_fees_uba: 0,
        })
        .unwrap_err();
    assert_eq!(
        err,
        TrackerError::Event(EventError::Pool(PoolError::InsufficientTokens {
            holder: "0xalice".to_string(),
            requested: 500,
            available: 0,
        }))
    );
}

// ============================================================================
// Transfers
// ============================================================================

#[test]
fn test_transfer_moves_only_debt_free_tokens() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);
    mint_with_pool_fee(&mut t, 400);
    enter(&mut t, "0xbob", 1_000, 0); // every bob token is debt-locked

    let err = t
        .apply_event(&ChainEvent::PoolTokenTransfer {
            agent_vault: VAULT.to_string(),
            from: "0xbob".to_string(),
            to: "0xcarol".to_string(),
            tokens: 1,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Event(EventError::Pool(PoolError::TokensLockedByDebt { .. }))
    ));

    // alice is debt-free, her tokens move
    t.apply_event(&ChainEvent::PoolTokenTransfer {
        agent_vault: VAULT.to_string(),
        from: "0xalice".to_string(),
        to: "0xcarol".to_string(),
        tokens: 400,
    })
    .unwrap();

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.balance_of("0xalice"), 600);
    assert_eq!(pool.balance_of("0xcarol"), 400);

    // both sides of the transfer report their new position
    let positions = t.facts().facts_of_type("pool_position_changed");
    let holders: Vec<&str> = positions
        .iter()
        .filter_map(|fact| match fact {
            LedgerFact::PoolPositionChanged { holder, .. } => Some(holder.as_str()),
            _ => None,
        })
        .collect();
    assert!(holders.contains(&"0xcarol"));
    assert_eq!(holders.iter().filter(|h| **h == "0xalice").count(), 2);
}

// ============================================================================
// Fee withdrawals
// ============================================================================

#[test]
fn test_fee_withdrawal_becomes_debt() {
    let mut t = tracker();
    enter(&mut t, "0xalice", 1_000, 0);
    mint_with_pool_fee(&mut t, 400);

    t.apply_event(&ChainEvent::PoolFeesWithdrawn {
        agent_vault: VAULT.to_string(),
        holder: "0xalice".to_string(),
        amount_uba: 150,
    })
    .unwrap();

    let pool = t.agent(VAULT).unwrap().pool();
    assert_eq!(pool.total_fees_uba(), 250);
    assert_eq!(pool.debt_of("0xalice"), 150);
    // the virtual entitlement is unchanged, only its free part shrank
    assert_eq!(pool.virtual_fees_of("0xalice"), 400);
    assert_eq!(pool.free_fees_of("0xalice"), 250);

    let err = t
        .apply_event(&ChainEvent::PoolFeesWithdrawn {
            agent_vault: VAULT.to_string(),
            holder: "0xalice".to_string(),
            amount_uba: 300,
        })
        .unwrap_err();
    assert_eq!(
        err,
        TrackerError::Event(EventError::Pool(PoolError::InsufficientFreeFees {
            holder: "0xalice".to_string(),
            requested: 300,
            available: 250,
        }))
    );
}

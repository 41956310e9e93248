//! Integration tests for the CryptoFiat protocol.
//!
//! These tests drive the deployed protocol end to end through its public
//! operations.

use cryptofiat::core::config::{ProtocolParams, StakeBasis};
use cryptofiat::core::token::{ExchangeRate, TokenAmount};
use cryptofiat::core::vault::CollateralAmount;
use cryptofiat::error::Error;
use cryptofiat::protocol::{Protocol, ProtocolEvent, QueryKind, Settlement};
use cryptofiat::storage::{FileStore, InMemoryStore};
use cryptofiat::utils::crypto::Address;

const ETHER: u128 = 1_000_000_000_000_000_000;
const ORACLE_FEE: u128 = 5_385_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

struct Actors {
    deployer: Address,
    oracle: Address,
    alice: Address,
    bob: Address,
    carol: Address,
}

fn actors() -> Actors {
    Actors {
        deployer: Address::derive("deployer"),
        oracle: Address::derive("oracle"),
        alice: Address::derive("alice"),
        bob: Address::derive("bob"),
        carol: Address::derive("carol"),
    }
}

fn deploy(params: ProtocolParams) -> (Protocol<InMemoryStore>, Actors) {
    let a = actors();
    let protocol = Protocol::deploy(InMemoryStore::new(), a.deployer, a.oracle, params).unwrap();
    (protocol, a)
}

fn rate(cents: u64) -> ExchangeRate {
    ExchangeRate::from_cents_per_ether(cents)
}

fn ether(n: u128) -> CollateralAmount {
    CollateralAmount::from_ether(n)
}

/// Deployed, initialized at block 0 with 20-block epochs, alice holding 98_461 cents
fn with_tokens() -> (Protocol<InMemoryStore>, Actors) {
    let (mut p, a) = deploy(ProtocolParams::default());
    p.initialize(&a.deployer, 20, 0).unwrap();
    p.endow(&a.deployer, &a.alice, ether(2)).unwrap();
    let query = p.buy(&a.alice, ether(1), 1).unwrap();
    p.settle(&a.oracle, &query, rate(100_000), 2).unwrap();
    (p, a)
}

/// `with_tokens`, plus 1 ether of buffer capital from carol so sells can pay
/// the oracle fee
fn with_buffer() -> (Protocol<InMemoryStore>, Actors) {
    let (mut p, a) = with_tokens();
    p.endow(&a.deployer, &a.carol, ether(1)).unwrap();
    p.capitalize(&a.carol, ether(1), 2).unwrap();
    (p, a)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HUB LIFECYCLE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_buy_then_sell_round_trip() {
    let (mut p, a) = with_buffer();

    assert_eq!(p.balance_of(&a.alice).unwrap().cents(), 98_461);
    assert_eq!(p.reserved_collateral(&a.alice).unwrap().wei(), 984_615_000_000_000_000);
    assert_eq!(p.total_supply().unwrap().cents(), 98_461);
    assert_eq!(p.collateral_of(&a.oracle).unwrap().wei(), ORACLE_FEE);
    assert_eq!(p.nth_pool_balance(0).unwrap().wei(), 5_000_000_000_000_000);

    let sell = p.sell(&a.alice, TokenAmount::from_cents(10_000), 3).unwrap();
    let settlement = p.settle(&a.oracle, &sell, rate(100_000), 4).unwrap();

    assert_eq!(
        settlement,
        Settlement::Redeemed {
            tokens: TokenAmount::from_cents(10_000),
            payout: CollateralAmount::from_wei(94_615_000_000_000_000),
            released: CollateralAmount::from_wei(100_000_507_815_277_114),
        }
    );
    assert_eq!(p.balance_of(&a.alice).unwrap().cents(), 88_461);
    assert_eq!(
        p.reserved_collateral(&a.alice).unwrap().wei(),
        884_614_492_184_722_886
    );
    assert_eq!(
        p.collateral_of(&a.alice).unwrap().wei(),
        ETHER + 94_615_000_000_000_000
    );
    assert_eq!(p.collateral_of(&a.oracle).unwrap().wei(), 2 * ORACLE_FEE);
    assert_eq!(p.contract_balance().unwrap().wei(), 1_889_615_000_000_000_000);
    p.verify_invariants().unwrap();
}

#[test]
fn test_settlement_events_follow_each_query() {
    let (mut p, a) = with_buffer();
    let sell = p.sell(&a.alice, TokenAmount::from_cents(10_000), 3).unwrap();
    p.settle(&a.oracle, &sell, rate(100_000), 4).unwrap();

    let trail: Vec<&str> = p
        .events()
        .for_query(&sell)
        .into_iter()
        .map(ProtocolEvent::event_type)
        .collect();
    assert_eq!(trail, vec!["QueryCreated", "TokensRedeemed", "QuerySettled"]);
    assert_eq!(p.events().filter_by_type("TokensIssued").len(), 1);
}

#[test]
fn test_settle_is_oracle_only_and_single_use() {
    let (mut p, a) = with_buffer();
    let sell = p.sell(&a.alice, TokenAmount::from_cents(10_000), 3).unwrap();

    assert!(matches!(
        p.settle(&a.alice, &sell, rate(100_000), 4),
        Err(Error::Unauthorized(_))
    ));
    assert_eq!(p.settle(&a.oracle, &sell, rate(0), 4), Err(Error::InvalidPrice(0)));

    p.settle(&a.oracle, &sell, rate(100_000), 4).unwrap();
    assert!(matches!(
        p.settle(&a.oracle, &sell, rate(100_000), 5),
        Err(Error::UnknownQuery(_))
    ));
}

#[test]
fn test_small_payments_rejected() {
    let (mut p, a) = deploy(ProtocolParams::default());
    p.initialize(&a.deployer, 20, 0).unwrap();
    p.endow(&a.deployer, &a.alice, ether(1)).unwrap();

    let err = p
        .buy(&a.alice, CollateralAmount::from_wei(ORACLE_FEE), 1)
        .unwrap_err();
    assert!(matches!(err, Error::BelowMinimumPayment { .. }));
    assert_eq!(p.collateral_of(&a.alice).unwrap(), ether(1));
    assert!(p.events().is_empty());
}

#[test]
fn test_sell_more_than_held() {
    let (mut p, a) = with_tokens();
    let err = p.sell(&a.alice, TokenAmount::from_cents(98_462), 3).unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { ref asset, .. } if asset == "token"));
    assert_eq!(p.sell(&a.alice, TokenAmount::ZERO, 3), Err(Error::ZeroAmount));
}

#[test]
fn test_sells_cannot_spend_reserves() {
    let (mut p, a) = with_tokens();
    p.endow(&a.deployer, &a.carol, CollateralAmount::from_wei(ORACLE_FEE)).unwrap();
    p.capitalize(&a.carol, CollateralAmount::from_wei(ORACLE_FEE), 2).unwrap();

    // Enough free buffer for one oracle fee, not two
    let cent = TokenAmount::from_cents(1);
    p.sell(&a.alice, cent, 3).unwrap();
    for _ in 0..2 {
        let err = p.sell(&a.alice, cent, 3).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { ref asset, .. } if asset == "collateral"));
    }
    assert_eq!(p.free_collateral().unwrap().wei(), 5_000_000_000_000_000);
    assert!(p.total_reserved().unwrap() <= p.contract_balance().unwrap());

    p.endow(&a.deployer, &a.bob, ether(1)).unwrap();
    let buy = p.buy(&a.bob, ether(1), 4).unwrap();
    p.settle(&a.oracle, &buy, rate(100_000), 5).unwrap();

    assert_eq!(p.total_reserved().unwrap().wei(), 1_969_230_000_000_000_000);
    assert_eq!(p.contract_balance().unwrap().wei(), 1_979_230_000_000_000_000);
    assert_eq!(p.pending_queries().unwrap().len(), 1);
    p.verify_invariants().unwrap();
}

#[test]
fn test_buffer_tracks_price() {
    let (mut p, a) = with_tokens();

    // 989.615e15 held against 984.61e15 owed at the settlement price
    assert_eq!(p.buffer(rate(100_000)).unwrap(), 5_005_000_000_000_000);

    // Halving the price doubles the collateral owed
    assert_eq!(p.buffer(rate(50_000)).unwrap(), -979_605_000_000_000_000);

    p.capitalize(&a.alice, ether(1), 3).unwrap();
    assert_eq!(p.buffer(rate(50_000)).unwrap(), 20_395_000_000_000_000);
    assert_eq!(p.events().filter_by_type("Capitalized").len(), 1);

    let status = p.status(3, Some(rate(50_000))).unwrap();
    assert_eq!(status.buffer, Some(20_395_000_000_000_000));
    assert_eq!(status.total_supply.cents(), 98_461);
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUERY EXPIRY TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_expired_buy_refunds_net() {
    let (mut p, a) = deploy(ProtocolParams::default().with_query_ttl(10));
    p.initialize(&a.deployer, 20, 0).unwrap();
    p.endow(&a.deployer, &a.alice, ether(1)).unwrap();
    let query = p.buy(&a.alice, ether(1), 5).unwrap();

    let err = p.expire_query(&a.bob, &query, 14).unwrap_err();
    assert!(matches!(err, Error::QueryNotExpired { expires_at: 15, .. }));

    let refunded = p.expire_query(&a.bob, &query, 15).unwrap();
    assert_eq!(refunded.wei(), 984_615_000_000_000_000);
    assert_eq!(p.collateral_of(&a.alice).unwrap(), refunded);
    assert!(p.pending_query(&query).unwrap().is_none());
    assert!(matches!(
        p.settle(&a.oracle, &query, rate(100_000), 16),
        Err(Error::UnknownQuery(_))
    ));

    match p.events().last() {
        Some(ProtocolEvent::QueryExpired(e)) => {
            assert_eq!(e.kind, QueryKind::Buy);
            assert_eq!(e.refunded, refunded);
        }
        other => panic!("unexpected event {:?}", other),
    }
    p.verify_invariants().unwrap();
}

#[test]
fn test_expired_sell_forfeits_fee() {
    let (mut p, a) = deploy(ProtocolParams::default().with_query_ttl(10));
    p.initialize(&a.deployer, 20, 0).unwrap();
    p.endow(&a.deployer, &a.alice, ether(2)).unwrap();
    let buy = p.buy(&a.alice, ether(1), 1).unwrap();
    p.settle(&a.oracle, &buy, rate(100_000), 2).unwrap();

    // The oracle fee exceeds the 0.5% buffer fee
    let err = p.sell(&a.alice, TokenAmount::from_cents(10_000), 3).unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { ref asset, .. } if asset == "collateral"));
    assert!(p.pending_queries().unwrap().is_empty());

    p.capitalize(&a.alice, ether(1), 3).unwrap();
    let sell = p.sell(&a.alice, TokenAmount::from_cents(10_000), 3).unwrap();
    assert!(matches!(
        p.expire_query(&a.bob, &sell, 12),
        Err(Error::QueryNotExpired { expires_at: 13, .. })
    ));

    assert_eq!(p.expire_query(&a.bob, &sell, 13).unwrap(), CollateralAmount::ZERO);
    assert_eq!(p.balance_of(&a.alice).unwrap().cents(), 98_461);
    assert_eq!(p.collateral_of(&a.oracle).unwrap().wei(), 2 * ORACLE_FEE);
    assert_eq!(p.free_collateral().unwrap().wei(), 999_615_000_000_000_000);
    p.verify_invariants().unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARDS TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_rewards_from_buy_fees_and_deposits() {
    let (mut p, a) = deploy(ProtocolParams::default());
    p.initialize(&a.deployer, 20, 10).unwrap();
    p.mint_stake(&a.deployer, &a.alice, 500, 10).unwrap();
    p.mint_stake(&a.deployer, &a.bob, 500, 10).unwrap();
    p.endow(&a.deployer, &a.carol, ether(2)).unwrap();

    p.buy(&a.carol, ether(1), 11).unwrap();
    p.deposit_rewards(&a.carol, ether(1), 12).unwrap();
    assert_eq!(p.nth_pool_balance(0).unwrap().wei(), 1_005_000_000_000_000_000);

    assert_eq!(p.withdraw_rewards(&a.alice, 29), Err(Error::NothingToClaim));

    let paid = p.withdraw_rewards(&a.alice, 30).unwrap();
    assert_eq!(paid.wei(), 251_250_000_000_000_000);
    assert_eq!(p.collateral_of(&a.alice).unwrap(), paid);
    assert_eq!(p.last_withdrawal_epoch(&a.alice).unwrap(), Some(0));
    assert_eq!(p.recorded_epoch().unwrap(), 1);

    assert_eq!(
        p.withdraw_rewards(&a.alice, 40),
        Err(Error::AlreadyWithdrawn { last_epoch: 0 })
    );
    assert_eq!(p.claimable(&a.bob, 40).unwrap().amount, paid);
    p.verify_invariants().unwrap();
}

#[test]
fn test_stake_basis_changes_payout() {
    let run = |basis: StakeBasis| {
        let (mut p, a) = deploy(ProtocolParams::default().with_stake_basis(basis));
        p.initialize(&a.deployer, 20, 10).unwrap();
        p.mint_stake(&a.deployer, &a.alice, 500, 10).unwrap();
        p.mint_stake(&a.deployer, &a.bob, 500, 10).unwrap();
        p.endow(&a.deployer, &a.carol, ether(2)).unwrap();

        p.deposit_rewards(&a.carol, ether(1), 15).unwrap();
        p.transfer_stake(&a.bob, &a.alice, 500, 31).unwrap();
        p.deposit_rewards(&a.carol, ether(1), 35).unwrap();

        let alice = p.claimable(&a.alice, 50).unwrap();
        let bob = p.claimable(&a.bob, 50).map(|c| c.amount);
        (alice.amount.wei(), bob)
    };

    // Stake at the withdrawal block: alice holds everything
    let (alice, bob) = run(StakeBasis::AtWithdrawal);
    assert_eq!(alice, ETHER);
    assert_eq!(bob, Ok(CollateralAmount::ZERO));

    // Stake at each epoch's first block: the transfer happened after both
    let (alice, bob) = run(StakeBasis::EpochStart);
    assert_eq!(alice, ETHER / 2);
    assert_eq!(bob, Ok(CollateralAmount::from_wei(ETHER / 2)));
}

#[test]
fn test_sealed_epoch_stays_sealed() {
    let (mut p, a) = deploy(ProtocolParams::default());
    p.initialize(&a.deployer, 20, 0).unwrap();
    p.mint_stake(&a.deployer, &a.alice, 500, 0).unwrap();
    p.mint_stake(&a.deployer, &a.bob, 500, 0).unwrap();
    p.endow(&a.deployer, &a.carol, ether(3)).unwrap();

    p.deposit_rewards(&a.carol, ether(1), 5).unwrap();
    let paid = p.withdraw_rewards(&a.alice, 25).unwrap();
    assert_eq!(paid.wei(), ETHER / 4);

    // Crossing into epoch 2 seals epoch 1 with nothing in it
    p.deposit_rewards(&a.carol, ether(1), 45).unwrap();
    assert_eq!(p.recorded_epoch().unwrap(), 2);
    assert_eq!(p.events().filter_by_type("EpochAdvanced").len(), 2);

    for block in [3, 44] {
        let err = p.deposit_rewards(&a.carol, ether(1), block).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "block"));
    }
    assert_eq!(p.nth_pool_balance(0).unwrap().wei(), ETHER);
    assert!(p.nth_pool_balance(1).unwrap().is_zero());
    assert_eq!(p.nth_pool_balance(2).unwrap().wei(), ETHER);
    assert_eq!(p.collateral_of(&a.carol).unwrap(), ether(1));
    assert_eq!(p.claimable(&a.bob, 45).unwrap().amount.wei(), ETHER / 4);
    p.verify_invariants().unwrap();
}

#[test]
fn test_failed_deposit_leaves_epoch_untouched() {
    let (mut p, a) = deploy(ProtocolParams::default());
    p.initialize(&a.deployer, 20, 0).unwrap();
    let events_before = p.events().len();

    // Advancing the epoch is staged before the transfer fails
    let err = p.deposit_rewards(&a.alice, ether(1), 45).unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(p.recorded_epoch().unwrap(), 0);
    assert_eq!(p.events().len(), events_before);

    assert_eq!(p.deposit_rewards(&a.alice, CollateralAmount::ZERO, 45), Err(Error::ZeroDeposit));
}

#[test]
fn test_privileged_operations() {
    let (mut p, a) = deploy(ProtocolParams::default());
    assert!(matches!(
        p.initialize(&a.alice, 20, 0),
        Err(Error::Unauthorized(_))
    ));
    p.initialize(&a.deployer, 20, 0).unwrap();
    assert_eq!(p.initialize(&a.deployer, 20, 1), Err(Error::AlreadyInitialized));

    assert!(matches!(
        p.endow(&a.alice, &a.alice, ether(1)),
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        p.mint_stake(&a.alice, &a.alice, 1, 1),
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        p.authorize_store(&a.alice, &a.alice),
        Err(Error::Unauthorized(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let a = actors();
    let query = {
        let mut p = Protocol::deploy(
            FileStore::new(dir.path()).unwrap(),
            a.deployer,
            a.oracle,
            ProtocolParams::default(),
        )
        .unwrap();
        p.initialize(&a.deployer, 20, 0).unwrap();
        p.endow(&a.deployer, &a.alice, ether(1)).unwrap();
        p.buy(&a.alice, ether(1), 1).unwrap()
    };

    let mut p = Protocol::deploy(
        FileStore::new(dir.path()).unwrap(),
        a.deployer,
        a.oracle,
        ProtocolParams::default(),
    )
    .unwrap();
    assert_eq!(p.initialize(&a.deployer, 20, 2), Err(Error::AlreadyInitialized));
    assert!(p.pending_query(&query).unwrap().is_some());

    p.settle(&a.oracle, &query, rate(100_000), 2).unwrap();
    assert_eq!(p.balance_of(&a.alice).unwrap().cents(), 98_461);
    p.verify_invariants().unwrap();
}

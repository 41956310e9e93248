//! The hub: collateral buffer and price-dependent settlement.
//!
//! Buys and sells are two-phase. The request commits value and records a
//! [`PendingQuery`]; settlement runs when the oracle delivers a price and
//! consumes the query exactly once.
//!
//! ## Buy
//!
//! ```text
//! rewards_fee = floor(payment * rewards_fee_bps / 10000)
//! buffer_fee  = floor(payment * buffer_fee_bps  / 10000)
//! net         = payment - rewards_fee - buffer_fee - oracle_fee
//! tokens      = floor(net * price / 10^18)
//! ```
//!
//! ## Sell
//!
//! ```text
//! gross  = floor(tokens * 10^18 / price)
//! payout = gross - oracle_fee
//! ```
//!
//! The buffer fee never leaves the hub. Together with rounding residue and
//! capitalization it forms the collateral buffer.
//!
//! ## Coverage
//!
//! Collateral reserved against tokens plus the net value escrowed by pending
//! buys is committed. The hub balance never drops below it. A sell request
//! pays its oracle fee out of the free remainder, so a sell is refused while
//! the buffer cannot cover the fee.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::config::ProtocolParams;
use crate::core::token::{ExchangeRate, SyntheticToken, TokenAmount};
use crate::core::vault::{CollateralAmount, Vault};
use crate::error::{Error, Result};
use crate::protocol::events::*;
use crate::protocol::query::{PendingQuery, QueryKind};
use crate::rewards::{EpochSchedule, RewardsPool};
use crate::storage::{make_key, prefixes, LedgerStore, StorageBackend};
use crate::utils::constants::HUB_LABEL;
use crate::utils::crypto::{Address, QueryId};
use crate::utils::math::{bps_of, safe_add, signed_diff};

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fee breakdown of a buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    /// Collateral paid in
    pub payment: CollateralAmount,
    /// Routed to the rewards pool
    pub rewards_fee: CollateralAmount,
    /// Kept in the buffer
    pub buffer_fee: CollateralAmount,
    /// Paid to the oracle
    pub oracle_fee: CollateralAmount,
    /// Collateral that will back the issued tokens
    pub net: CollateralAmount,
}

/// What a settlement did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Settlement {
    /// Tokens issued for a buy
    Issued {
        /// Tokens minted
        tokens: TokenAmount,
        /// Collateral reserved against them
        collateral: CollateralAmount,
    },
    /// Tokens redeemed for a sell
    Redeemed {
        /// Tokens burned
        tokens: TokenAmount,
        /// Collateral paid to the holder
        payout: CollateralAmount,
        /// Reserve released by the burn
        released: CollateralAmount,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// HUB
// ═══════════════════════════════════════════════════════════════════════════════

/// The hub component
#[derive(Debug, Clone)]
pub struct Hub {
    address: Address,
    deployer: Address,
    oracle: Address,
    token: SyntheticToken,
    vault: Vault,
    rewards: RewardsPool,
    params: ProtocolParams,
}

impl Hub {
    /// Create the hub over its collaborators
    pub fn new(
        deployer: Address,
        oracle: Address,
        token: SyntheticToken,
        vault: Vault,
        rewards: RewardsPool,
        params: ProtocolParams,
    ) -> Self {
        Self {
            address: Address::derive(HUB_LABEL),
            deployer,
            oracle,
            token,
            vault,
            rewards,
            params,
        }
    }

    /// The hub's store identity, which also holds the collateral buffer
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Identity allowed to deliver prices
    pub fn oracle(&self) -> &Address {
        &self.oracle
    }

    /// Active parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start the epoch clock at `block`. Deployer only, once.
    pub fn initialize<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        blocks_per_epoch: u64,
        block: u64,
    ) -> Result<EpochSchedule> {
        if caller != &self.deployer {
            return Err(Error::Unauthorized(format!(
                "{} cannot initialize the protocol",
                caller.short()
            )));
        }
        let schedule = EpochSchedule::new(block, blocks_per_epoch)?;
        schedule.save(store, &self.address)?;
        info!(block, blocks_per_epoch, "protocol initialized");
        Ok(schedule)
    }

    /// Add the caller's collateral to the buffer without issuing tokens
    pub fn capitalize<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        amount: CollateralAmount,
        block: u64,
    ) -> Result<CollateralAmount> {
        EpochSchedule::load(store)?;
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        self.vault.transfer(store, caller, &self.address, amount)?;
        let contract_balance = self.contract_balance(store)?;

        events.push(ProtocolEvent::Capitalized(CapitalizedEvent {
            funder: *caller,
            amount,
            contract_balance,
            block_height: block,
        }));
        info!(funder = %caller.short(), amount = amount.wei(), "buffer capitalized");
        Ok(contract_balance)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REQUESTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Split a buy payment into fees and net collateral
    pub fn quote_buy(&self, payment: CollateralAmount) -> Result<BuyQuote> {
        let rewards_fee = bps_of(payment.wei(), self.params.rewards_fee_bps)?;
        let buffer_fee = bps_of(payment.wei(), self.params.buffer_fee_bps)?;
        let oracle_fee = self.params.oracle_fee;
        let total_fees = safe_add(safe_add(rewards_fee, buffer_fee)?, oracle_fee)?;

        if payment.wei() <= total_fees {
            return Err(Error::BelowMinimumPayment {
                amount: payment.wei(),
                minimum: total_fees,
            });
        }

        Ok(BuyQuote {
            payment,
            rewards_fee: CollateralAmount::from_wei(rewards_fee),
            buffer_fee: CollateralAmount::from_wei(buffer_fee),
            oracle_fee: CollateralAmount::from_wei(oracle_fee),
            net: CollateralAmount::from_wei(payment.wei() - total_fees),
        })
    }

    /// Pay `payment` in and request a price to issue tokens against it
    pub fn buy<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        payment: CollateralAmount,
        block: u64,
    ) -> Result<QueryId> {
        EpochSchedule::load(store)?;
        let quote = self.quote_buy(payment)?;

        self.vault.transfer(store, caller, &self.address, payment)?;
        self.vault
            .transfer(store, &self.address, &self.oracle, quote.oracle_fee)?;
        if !quote.rewards_fee.is_zero() {
            self.rewards
                .deposit(store, events, &self.address, quote.rewards_fee, block)?;
        }

        let query = self.record_query(
            store,
            events,
            QueryKind::Buy,
            caller,
            quote.net.wei(),
            quote.oracle_fee,
            block,
        )?;
        info!(
            query_id = %query.short(),
            requestor = %caller.short(),
            payment = payment.wei(),
            net = quote.net.wei(),
            "buy requested"
        );
        Ok(query)
    }

    /// Offer `amount` tokens and request a price to redeem them
    pub fn sell<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        amount: TokenAmount,
        block: u64,
    ) -> Result<QueryId> {
        EpochSchedule::load(store)?;
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let balance = self.token.balance_of(store, caller)?;
        if balance < amount {
            return Err(Error::insufficient("token", amount.cents(), balance.cents()));
        }

        // The hub fronts the oracle fee and recovers it from the payout
        let oracle_fee = CollateralAmount::from_wei(self.params.oracle_fee);
        let free = self.free_collateral(store)?;
        if free < oracle_fee {
            return Err(Error::insufficient("collateral", oracle_fee.wei(), free.wei()));
        }
        self.vault
            .transfer(store, &self.address, &self.oracle, oracle_fee)?;

        let query = self.record_query(
            store,
            events,
            QueryKind::Sell,
            caller,
            amount.cents(),
            oracle_fee,
            block,
        )?;
        info!(
            query_id = %query.short(),
            requestor = %caller.short(),
            tokens = amount.cents(),
            "sell requested"
        );
        Ok(query)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_query<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        kind: QueryKind,
        requestor: &Address,
        value: u128,
        oracle_fee: CollateralAmount,
        block: u64,
    ) -> Result<QueryId> {
        let nonce: u64 = store.get_or_default(prefixes::HUB_NONCE)?;
        let next = nonce.checked_add(1).ok_or_else(|| Error::Overflow {
            operation: "query nonce".into(),
        })?;
        let id = QueryId::generate(&self.address, nonce, requestor, block);

        let query = PendingQuery {
            id,
            kind,
            requestor: *requestor,
            value,
            oracle_fee,
            created_at: block,
        };
        store.set(&self.address, prefixes::HUB_NONCE, &next)?;
        store.set(&self.address, &query_key(&id), &query)?;

        events.push(ProtocolEvent::QueryCreated(QueryCreatedEvent {
            query_id: id,
            kind,
            requestor: *requestor,
            value,
            oracle_fee,
            block_height: block,
        }));
        Ok(id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Complete a pending query at the delivered `price`. Oracle only.
    pub fn settle<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        query_id: &QueryId,
        price: ExchangeRate,
        block: u64,
    ) -> Result<Settlement> {
        if caller != &self.oracle {
            warn!(caller = %caller.short(), query_id = %query_id.short(), "settlement from non-oracle");
            return Err(Error::Unauthorized(format!(
                "{} is not the oracle",
                caller.short()
            )));
        }
        if price.cents_per_ether() == 0 {
            return Err(Error::InvalidPrice(0));
        }
        let query = self.take_query(store, query_id)?;

        let settlement = match query.kind {
            QueryKind::Buy => self.settle_buy(store, events, &query, price, block)?,
            QueryKind::Sell => self.settle_sell(store, events, &query, price, block)?,
        };

        events.push(ProtocolEvent::QuerySettled(QuerySettledEvent {
            query_id: *query_id,
            kind: query.kind,
            price,
            block_height: block,
        }));
        Ok(settlement)
    }

    fn settle_buy<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        query: &PendingQuery,
        price: ExchangeRate,
        block: u64,
    ) -> Result<Settlement> {
        let collateral = CollateralAmount::from_wei(query.value);
        let tokens = price.tokens_for(collateral)?;
        self.token
            .mint(store, &self.address, &query.requestor, tokens, collateral)?;

        events.push(ProtocolEvent::TokensIssued(TokensIssuedEvent {
            query_id: query.id,
            holder: query.requestor,
            tokens,
            collateral,
            price,
            block_height: block,
        }));
        info!(
            query_id = %query.id.short(),
            holder = %query.requestor.short(),
            tokens = tokens.cents(),
            price = price.cents_per_ether(),
            "buy settled"
        );
        Ok(Settlement::Issued { tokens, collateral })
    }

    fn settle_sell<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        query: &PendingQuery,
        price: ExchangeRate,
        block: u64,
    ) -> Result<Settlement> {
        let tokens = TokenAmount::from_cents(query.value);
        let gross = price.collateral_for(tokens)?;
        let payout = gross
            .checked_sub(query.oracle_fee)
            .ok_or(Error::BelowMinimumPayment {
                amount: gross.wei(),
                minimum: query.oracle_fee.wei(),
            })?;

        let released = self
            .token
            .burn(store, &self.address, &query.requestor, tokens)?;
        self.vault
            .transfer(store, &self.address, &query.requestor, payout)?;
        self.ensure_reserve_covered(store)?;

        events.push(ProtocolEvent::TokensRedeemed(TokensRedeemedEvent {
            query_id: query.id,
            holder: query.requestor,
            tokens,
            gross,
            payout,
            released,
            price,
            block_height: block,
        }));
        info!(
            query_id = %query.id.short(),
            holder = %query.requestor.short(),
            tokens = tokens.cents(),
            payout = payout.wei(),
            price = price.cents_per_ether(),
            "sell settled"
        );
        Ok(Settlement::Redeemed {
            tokens,
            payout,
            released,
        })
    }

    /// Drop a query the oracle never answered, refunding a buy's net value
    pub fn expire_query<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        query_id: &QueryId,
        block: u64,
    ) -> Result<CollateralAmount> {
        let ttl = self
            .params
            .query_ttl_blocks
            .ok_or(Error::QueryExpiryDisabled)?;
        let query = self
            .pending_query(store, query_id)?
            .ok_or_else(|| Error::UnknownQuery(query_id.to_hex()))?;

        let expires_at = query.expires_at(ttl);
        if block < expires_at {
            return Err(Error::QueryNotExpired {
                query_id: query_id.to_hex(),
                expires_at,
            });
        }
        self.take_query(store, query_id)?;

        let refunded = query.net_collateral().unwrap_or(CollateralAmount::ZERO);
        self.vault
            .transfer(store, &self.address, &query.requestor, refunded)?;
        self.ensure_reserve_covered(store)?;

        events.push(ProtocolEvent::QueryExpired(QueryExpiredEvent {
            query_id: *query_id,
            kind: query.kind,
            requestor: query.requestor,
            refunded,
            block_height: block,
        }));
        warn!(
            query_id = %query_id.short(),
            kind = %query.kind,
            refunded = refunded.wei(),
            "pending query expired"
        );
        Ok(refunded)
    }

    fn take_query<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        query_id: &QueryId,
    ) -> Result<PendingQuery> {
        let query = self
            .pending_query(store, query_id)?
            .ok_or_else(|| Error::UnknownQuery(query_id.to_hex()))?;
        store.delete(&self.address, &query_key(query_id))?;
        debug!(query_id = %query_id.short(), "query consumed");
        Ok(query)
    }

    fn ensure_reserve_covered<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<()> {
        let committed = self.committed_collateral(store)?;
        let balance = self.contract_balance(store)?;
        if committed > balance {
            return Err(Error::insufficient("collateral", committed.wei(), balance.wei()));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral held by the hub
    pub fn contract_balance<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
    ) -> Result<CollateralAmount> {
        self.vault.balance_of(store, &self.address)
    }

    /// Net collateral escrowed by pending buys
    pub fn pending_escrow<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<CollateralAmount> {
        let mut escrow = 0u128;
        for query in self.pending_queries(store)? {
            if let Some(net) = query.net_collateral() {
                escrow = safe_add(escrow, net.wei())?;
            }
        }
        Ok(CollateralAmount::from_wei(escrow))
    }

    /// Reserved collateral plus pending buy escrow
    pub fn committed_collateral<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
    ) -> Result<CollateralAmount> {
        let reserved = self.token.total_reserved(store)?;
        let escrow = self.pending_escrow(store)?;
        Ok(CollateralAmount::from_wei(safe_add(reserved.wei(), escrow.wei())?))
    }

    /// Hub balance beyond what is committed; zero when under-covered
    pub fn free_collateral<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<CollateralAmount> {
        let balance = self.contract_balance(store)?;
        Ok(balance.saturating_sub(self.committed_collateral(store)?))
    }

    /// Collateral needed to redeem the whole supply at `price`
    pub fn total_outstanding<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        price: ExchangeRate,
    ) -> Result<CollateralAmount> {
        price.collateral_for(self.token.total_supply(store)?)
    }

    /// Contract balance minus total outstanding; negative when under water
    pub fn buffer<B: StorageBackend>(&self, store: &LedgerStore<B>, price: ExchangeRate) -> Result<i128> {
        let balance = self.contract_balance(store)?;
        let outstanding = self.total_outstanding(store, price)?;
        signed_diff(balance.wei(), outstanding.wei())
    }

    /// Look up a pending query
    pub fn pending_query<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        query_id: &QueryId,
    ) -> Result<Option<PendingQuery>> {
        store.get(&query_key(query_id))
    }

    /// All pending queries, oldest first
    pub fn pending_queries<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<Vec<PendingQuery>> {
        let mut queries = Vec::new();
        for key in store.keys_with_prefix(prefixes::HUB_QUERY)? {
            if let Some(query) = store.get::<PendingQuery>(&key)? {
                queries.push(query);
            }
        }
        queries.sort_by_key(|q| q.created_at);
        Ok(queries)
    }
}

fn query_key(id: &QueryId) -> Vec<u8> {
    make_key(prefixes::HUB_QUERY, id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StakeBasis;
    use crate::rewards::StakeToken;
    use crate::storage::InMemoryStore;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    struct Fixture {
        store: LedgerStore<InMemoryStore>,
        hub: Hub,
        token: SyntheticToken,
        vault: Vault,
        deployer: Address,
        oracle: Address,
        alice: Address,
    }

    fn setup(params: ProtocolParams) -> Fixture {
        let deployer = Address::derive("deployer");
        let oracle = Address::derive("oracle");
        let alice = Address::derive("alice");
        let store = LedgerStore::new(InMemoryStore::new(), deployer);

        let vault = Vault::new(deployer);
        let token = SyntheticToken::new(deployer);
        let stake = StakeToken::new(deployer);
        let rewards = RewardsPool::new(vault.clone(), stake.clone(), 5_000, StakeBasis::AtWithdrawal);
        let hub = Hub::new(deployer, oracle, token.clone(), vault.clone(), rewards.clone(), params);

        for identity in [vault.address(), token.address(), stake.address(), rewards.address(), hub.address()] {
            store.authorize(&deployer, identity).unwrap();
        }
        token.authorize(&store, &deployer, hub.address()).unwrap();
        vault
            .endow(&store, &deployer, &alice, CollateralAmount::from_ether(5))
            .unwrap();
        hub.initialize(&store, &deployer, 20, 0).unwrap();

        Fixture {
            store,
            hub,
            token,
            vault,
            deployer,
            oracle,
            alice,
        }
    }

    #[test]
    fn test_quote_buy() {
        let f = setup(ProtocolParams::default());
        let quote = f.hub.quote_buy(CollateralAmount::from_wei(ETHER)).unwrap();
        assert_eq!(quote.rewards_fee.wei(), 5_000_000_000_000_000);
        assert_eq!(quote.buffer_fee.wei(), 5_000_000_000_000_000);
        assert_eq!(quote.net.wei(), 984_615_000_000_000_000);

        let fee = f.hub.params().oracle_fee;
        assert!(matches!(
            f.hub.quote_buy(CollateralAmount::from_wei(fee)),
            Err(Error::BelowMinimumPayment { .. })
        ));
    }

    #[test]
    fn test_initialize_once_and_deployer_only() {
        let f = setup(ProtocolParams::default());
        assert_eq!(
            f.hub.initialize(&f.store, &f.deployer, 20, 5),
            Err(Error::AlreadyInitialized)
        );
        assert!(matches!(
            f.hub.initialize(&f.store, &f.alice, 20, 5),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_buy_then_settle() {
        let f = setup(ProtocolParams::default());
        let mut events = EventLog::new();

        let id = f
            .hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();
        let pending = f.hub.pending_query(&f.store, &id).unwrap().unwrap();
        assert_eq!(pending.kind, QueryKind::Buy);
        assert_eq!(pending.value, 984_615_000_000_000_000);
        assert_eq!(
            f.vault.balance_of(&f.store, &f.oracle).unwrap().wei(),
            5_385_000_000_000_000
        );

        let settlement = f
            .hub
            .settle(&f.store, &mut events, &f.oracle, &id, ExchangeRate::from_cents_per_ether(100_000), 2)
            .unwrap();
        assert_eq!(
            settlement,
            Settlement::Issued {
                tokens: TokenAmount::from_cents(98_461),
                collateral: CollateralAmount::from_wei(984_615_000_000_000_000),
            }
        );
        assert_eq!(f.token.balance_of(&f.store, &f.alice).unwrap().cents(), 98_461);
        assert!(f.hub.pending_query(&f.store, &id).unwrap().is_none());
        assert_eq!(events.for_query(&id).len(), 3);
    }

    #[test]
    fn test_settle_rejects_non_oracle_and_replays() {
        let f = setup(ProtocolParams::default());
        let mut events = EventLog::new();
        let id = f
            .hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();
        let price = ExchangeRate::from_cents_per_ether(100_000);

        assert!(matches!(
            f.hub.settle(&f.store, &mut events, &f.alice, &id, price, 2),
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(
            f.hub.settle(&f.store, &mut events, &f.oracle, &id, ExchangeRate::default(), 2),
            Err(Error::InvalidPrice(0))
        );
        f.hub.settle(&f.store, &mut events, &f.oracle, &id, price, 2).unwrap();
        assert!(matches!(
            f.hub.settle(&f.store, &mut events, &f.oracle, &id, price, 3),
            Err(Error::UnknownQuery(_))
        ));
    }

    #[test]
    fn test_sell_checks_balance() {
        let f = setup(ProtocolParams::default());
        let mut events = EventLog::new();
        assert_eq!(
            f.hub.sell(&f.store, &mut events, &f.alice, TokenAmount::ZERO, 1),
            Err(Error::ZeroAmount)
        );
        assert_eq!(
            f.hub.sell(&f.store, &mut events, &f.alice, TokenAmount::from_cents(1), 1),
            Err(Error::insufficient("token", 1, 0))
        );
    }

    #[test]
    fn test_sell_fee_comes_from_free_collateral() {
        let f = setup(ProtocolParams::default());
        let mut events = EventLog::new();
        let price = ExchangeRate::from_cents_per_ether(100_000);
        let first = f
            .hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();
        f.hub.settle(&f.store, &mut events, &f.oracle, &first, price, 2).unwrap();

        // Only the 0.5% buffer fee is free, short of the oracle fee
        assert_eq!(f.hub.free_collateral(&f.store).unwrap().wei(), 5_000_000_000_000_000);
        assert_eq!(
            f.hub.sell(&f.store, &mut events, &f.alice, TokenAmount::from_cents(1), 3),
            Err(Error::insufficient("collateral", 5_385_000_000_000_000, 5_000_000_000_000_000))
        );

        // A pending buy's escrow is committed; only its buffer fee is free
        f.hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 3)
            .unwrap();
        assert_eq!(f.hub.pending_escrow(&f.store).unwrap().wei(), 984_615_000_000_000_000);
        assert_eq!(f.hub.free_collateral(&f.store).unwrap().wei(), 10_000_000_000_000_000);

        f.hub
            .sell(&f.store, &mut events, &f.alice, TokenAmount::from_cents(1), 4)
            .unwrap();
        assert_eq!(f.hub.free_collateral(&f.store).unwrap().wei(), 4_615_000_000_000_000);
        assert!(
            f.hub.committed_collateral(&f.store).unwrap() <= f.hub.contract_balance(&f.store).unwrap()
        );
    }

    #[test]
    fn test_buffer_sign() {
        let f = setup(ProtocolParams::default().with_oracle_fee(0));
        let mut events = EventLog::new();
        f.hub
            .capitalize(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();
        let id = f
            .hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();
        f.hub
            .settle(&f.store, &mut events, &f.oracle, &id, ExchangeRate::from_cents_per_ether(20_000), 2)
            .unwrap();

        assert_eq!(
            f.hub.buffer(&f.store, ExchangeRate::from_cents_per_ether(20_000)).unwrap(),
            1_005_000_000_000_000_000
        );
        assert_eq!(
            f.hub.buffer(&f.store, ExchangeRate::from_cents_per_ether(2_000)).unwrap(),
            -7_905_000_000_000_000_000
        );
    }

    #[test]
    fn test_expiry_disabled_by_default() {
        let f = setup(ProtocolParams::default());
        let mut events = EventLog::new();
        let id = f
            .hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();
        assert_eq!(
            f.hub.expire_query(&f.store, &mut events, &id, 1_000_000),
            Err(Error::QueryExpiryDisabled)
        );
    }

    #[test]
    fn test_expiry_refunds_buy() {
        let f = setup(ProtocolParams::default().with_query_ttl(10));
        let mut events = EventLog::new();
        let id = f
            .hub
            .buy(&f.store, &mut events, &f.alice, CollateralAmount::from_ether(1), 1)
            .unwrap();

        assert!(matches!(
            f.hub.expire_query(&f.store, &mut events, &id, 10),
            Err(Error::QueryNotExpired { expires_at: 11, .. })
        ));
        let refunded = f.hub.expire_query(&f.store, &mut events, &id, 11).unwrap();
        assert_eq!(refunded.wei(), 984_615_000_000_000_000);
        assert!(f.hub.pending_queries(&f.store).unwrap().is_empty());
        assert!(matches!(
            f.hub.expire_query(&f.store, &mut events, &id, 12),
            Err(Error::UnknownQuery(_))
        ));
    }
}

//! Protocol State Machine - core orchestration engine.
//!
//! [`Protocol`] owns the ledger store and every component, wires their
//! authorizations at deployment, and runs each operation inside a single
//! store transaction. An operation either commits all of its writes and
//! events or none of them.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::config::ProtocolParams;
use crate::core::token::{ExchangeRate, SyntheticToken, TokenAmount};
use crate::core::vault::{CollateralAmount, Vault};
use crate::error::{Error, Result};
use crate::protocol::events::EventLog;
use crate::protocol::hub::{Hub, Settlement};
use crate::protocol::operations::{OperationResult, ProtocolOperation};
use crate::protocol::query::PendingQuery;
use crate::rewards::{Claim, EpochSchedule, RewardsPool, StakeToken};
use crate::storage::{prefixes, LedgerStore, StorageBackend};
use crate::utils::crypto::{Address, QueryId};

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every component handle, each knowing only its identity and parameters
#[derive(Debug, Clone)]
struct Components {
    deployer: Address,
    vault: Vault,
    token: SyntheticToken,
    stake: StakeToken,
    rewards: RewardsPool,
    hub: Hub,
    params: ProtocolParams,
}

impl Components {
    fn new(deployer: Address, oracle: Address, params: ProtocolParams) -> Self {
        let vault = Vault::new(deployer);
        let token = SyntheticToken::new(deployer);
        let stake = StakeToken::new(deployer);
        let rewards = RewardsPool::new(
            vault.clone(),
            stake.clone(),
            params.claim_share_bps,
            params.stake_basis,
        );
        let hub = Hub::new(
            deployer,
            oracle,
            token.clone(),
            vault.clone(),
            rewards.clone(),
            params.clone(),
        );
        Self {
            deployer,
            vault,
            token,
            stake,
            rewards,
            hub,
            params,
        }
    }

    fn identities(&self) -> [Address; 5] {
        [
            *self.vault.address(),
            *self.token.address(),
            *self.stake.address(),
            *self.rewards.address(),
            *self.hub.address(),
        ]
    }

    fn apply<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        op: ProtocolOperation,
        block: u64,
    ) -> Result<OperationResult> {
        if op.is_timed() {
            self.advance_clock(store, block)?;
        }
        match op {
            ProtocolOperation::Initialize { blocks_per_epoch } => {
                let len = blocks_per_epoch.unwrap_or(self.params.blocks_per_epoch);
                self.hub
                    .initialize(store, caller, len, block)
                    .map(OperationResult::Initialized)
            }
            ProtocolOperation::AuthorizeStore { identity } => {
                store.authorize(caller, &identity)?;
                Ok(OperationResult::Authorized)
            }
            ProtocolOperation::AuthorizeMinter { identity } => {
                self.token.authorize(store, caller, &identity)?;
                Ok(OperationResult::Authorized)
            }
            ProtocolOperation::Endow { to, amount } => {
                self.vault.endow(store, caller, &to, amount)?;
                self.vault.balance_of(store, &to).map(OperationResult::Endowed)
            }
            ProtocolOperation::Capitalize { amount } => self
                .hub
                .capitalize(store, events, caller, amount, block)
                .map(OperationResult::Capitalized),
            ProtocolOperation::Buy { payment } => self
                .hub
                .buy(store, events, caller, payment, block)
                .map(OperationResult::QueryCreated),
            ProtocolOperation::Sell { amount } => self
                .hub
                .sell(store, events, caller, amount, block)
                .map(OperationResult::QueryCreated),
            ProtocolOperation::Settle { query_id, price } => self
                .hub
                .settle(store, events, caller, &query_id, price, block)
                .map(OperationResult::Settled),
            ProtocolOperation::ExpireQuery { query_id } => self
                .hub
                .expire_query(store, events, &query_id, block)
                .map(OperationResult::Expired),
            ProtocolOperation::DepositRewards { amount } => self
                .rewards
                .deposit(store, events, caller, amount, block)
                .map(OperationResult::Deposited),
            ProtocolOperation::WithdrawRewards => self
                .rewards
                .withdraw(store, events, caller, block)
                .map(OperationResult::Withdrawn),
            ProtocolOperation::MintStake { to, amount } => {
                self.stake.mint(store, caller, &to, amount, block)?;
                self.stake.balance_of(store, &to).map(OperationResult::Stake)
            }
            ProtocolOperation::TransferStake { to, amount } => {
                self.stake.transfer(store, caller, &to, amount, block)?;
                self.stake.balance_of(store, &to).map(OperationResult::Stake)
            }
        }
    }
}

impl Components {
    /// Record `block` as the latest height, refusing to move backwards
    fn advance_clock<B: StorageBackend>(&self, store: &LedgerStore<B>, block: u64) -> Result<()> {
        let last: u64 = store.get_or_default(prefixes::LAST_BLOCK)?;
        if block < last {
            return Err(Error::InvalidParameter {
                name: "block".into(),
                reason: format!("{} is behind the last committed block {}", block, last),
            });
        }
        if block > last {
            store.set(self.hub.address(), prefixes::LAST_BLOCK, &block)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of the protocol's aggregate state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStatus {
    /// Block the snapshot was taken at
    pub block_height: u64,
    /// Epoch schedule, once initialized
    pub schedule: Option<EpochSchedule>,
    /// Epoch containing `block_height`
    pub current_epoch: Option<u64>,
    /// Total token supply
    pub total_supply: TokenAmount,
    /// Collateral held by the hub
    pub contract_balance: CollateralAmount,
    /// Collateral held by the rewards pool
    pub rewards_balance: CollateralAmount,
    /// Deposits in the current epoch pool
    pub current_pool_balance: Option<CollateralAmount>,
    /// Number of queries awaiting the oracle
    pub pending_queries: usize,
    /// Price used for the derived figures
    pub price: Option<ExchangeRate>,
    /// Collateral needed to redeem the whole supply at `price`
    pub total_outstanding: Option<CollateralAmount>,
    /// Contract balance minus outstanding, in wei
    pub buffer: Option<i128>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The deployed protocol: store, components, and committed event log
pub struct Protocol<B: StorageBackend> {
    store: LedgerStore<B>,
    components: Components,
    oracle: Address,
    event_log: EventLog,
}

impl<B: StorageBackend> Protocol<B> {
    /// Deploy over `backend`, granting every component its capabilities.
    ///
    /// Grants are idempotent, so deploying over an existing store reopens it.
    pub fn deploy(backend: B, deployer: Address, oracle: Address, params: ProtocolParams) -> Result<Self> {
        params.validate()?;
        let components = Components::new(deployer, oracle, params);
        let mut store = LedgerStore::new(backend, deployer);

        let identities = components.identities();
        let token = components.token.clone();
        let hub_address = *components.hub.address();
        store.atomic(|s| {
            for identity in identities.iter() {
                s.authorize(&deployer, identity)?;
            }
            token.authorize(s, &deployer, &hub_address)
        })?;

        info!(
            deployer = %deployer.short(),
            oracle = %oracle.short(),
            hub = %hub_address.short(),
            "protocol deployed"
        );
        Ok(Self {
            store,
            components,
            oracle,
            event_log: EventLog::new(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute an operation atomically on behalf of `caller`
    pub fn execute(
        &mut self,
        caller: &Address,
        op: ProtocolOperation,
        block: u64,
    ) -> Result<OperationResult> {
        let op_type = op.operation_type();
        let components = &self.components;
        let mut local = EventLog::new();

        let result = self
            .store
            .atomic(|s| components.apply(s, &mut local, caller, op, block));

        match &result {
            Ok(_) => {
                debug!(op = op_type, events = local.len(), block, "operation committed");
                self.event_log.merge(local);
            }
            Err(e) if e.is_critical() => {
                error!(op = op_type, caller = %caller.short(), code = e.code(), error = %e, "operation failed");
            }
            Err(e) => {
                warn!(
                    op = op_type,
                    caller = %caller.short(),
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "operation reverted"
                );
            }
        }
        result
    }

    /// Start the epoch clock. Deployer only.
    pub fn initialize(&mut self, caller: &Address, blocks_per_epoch: u64, block: u64) -> Result<EpochSchedule> {
        let op = ProtocolOperation::Initialize {
            blocks_per_epoch: Some(blocks_per_epoch),
        };
        match self.execute(caller, op, block)? {
            OperationResult::Initialized(schedule) => Ok(schedule),
            other => Err(unexpected(other)),
        }
    }

    /// Grant store write access. Deployer only.
    pub fn authorize_store(&mut self, caller: &Address, identity: &Address) -> Result<()> {
        let op = ProtocolOperation::AuthorizeStore { identity: *identity };
        self.execute(caller, op, 0).map(|_| ())
    }

    /// Grant token mint rights. Deployer only.
    pub fn authorize_minter(&mut self, caller: &Address, identity: &Address) -> Result<()> {
        let op = ProtocolOperation::AuthorizeMinter { identity: *identity };
        self.execute(caller, op, 0).map(|_| ())
    }

    /// Credit genesis collateral. Deployer only.
    pub fn endow(&mut self, caller: &Address, to: &Address, amount: CollateralAmount) -> Result<CollateralAmount> {
        match self.execute(caller, ProtocolOperation::Endow { to: *to, amount }, 0)? {
            OperationResult::Endowed(balance) => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    /// Add the caller's collateral to the buffer
    pub fn capitalize(&mut self, caller: &Address, amount: CollateralAmount, block: u64) -> Result<CollateralAmount> {
        match self.execute(caller, ProtocolOperation::Capitalize { amount }, block)? {
            OperationResult::Capitalized(balance) => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    /// Pay `payment` for tokens; returns the pending query
    pub fn buy(&mut self, caller: &Address, payment: CollateralAmount, block: u64) -> Result<QueryId> {
        match self.execute(caller, ProtocolOperation::Buy { payment }, block)? {
            OperationResult::QueryCreated(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Offer `amount` tokens for collateral; returns the pending query
    pub fn sell(&mut self, caller: &Address, amount: TokenAmount, block: u64) -> Result<QueryId> {
        match self.execute(caller, ProtocolOperation::Sell { amount }, block)? {
            OperationResult::QueryCreated(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Deliver the oracle price for a pending query
    pub fn settle(
        &mut self,
        caller: &Address,
        query_id: &QueryId,
        price: ExchangeRate,
        block: u64,
    ) -> Result<Settlement> {
        let op = ProtocolOperation::Settle {
            query_id: *query_id,
            price,
        };
        match self.execute(caller, op, block)? {
            OperationResult::Settled(settlement) => Ok(settlement),
            other => Err(unexpected(other)),
        }
    }

    /// Expire an unanswered query
    pub fn expire_query(&mut self, caller: &Address, query_id: &QueryId, block: u64) -> Result<CollateralAmount> {
        let op = ProtocolOperation::ExpireQuery { query_id: *query_id };
        match self.execute(caller, op, block)? {
            OperationResult::Expired(refunded) => Ok(refunded),
            other => Err(unexpected(other)),
        }
    }

    /// Fund the current epoch pool from the caller's collateral
    pub fn deposit_rewards(&mut self, caller: &Address, amount: CollateralAmount, block: u64) -> Result<CollateralAmount> {
        match self.execute(caller, ProtocolOperation::DepositRewards { amount }, block)? {
            OperationResult::Deposited(pool) => Ok(pool),
            other => Err(unexpected(other)),
        }
    }

    /// Claim every unclaimed sealed epoch
    pub fn withdraw_rewards(&mut self, caller: &Address, block: u64) -> Result<CollateralAmount> {
        match self.execute(caller, ProtocolOperation::WithdrawRewards, block)? {
            OperationResult::Withdrawn(amount) => Ok(amount),
            other => Err(unexpected(other)),
        }
    }

    /// Create stake. Deployer only.
    pub fn mint_stake(&mut self, caller: &Address, to: &Address, amount: u128, block: u64) -> Result<u128> {
        match self.execute(caller, ProtocolOperation::MintStake { to: *to, amount }, block)? {
            OperationResult::Stake(balance) => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    /// Move the caller's stake
    pub fn transfer_stake(&mut self, caller: &Address, to: &Address, amount: u128, block: u64) -> Result<u128> {
        match self.execute(caller, ProtocolOperation::TransferStake { to: *to, amount }, block)? {
            OperationResult::Stake(balance) => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check the ledger-wide invariants.
    ///
    /// Token supply must equal the sum of balances. The hub's balance must
    /// cover reserved collateral, and also pending buy escrow on top of it.
    /// Collateral held across all accounts must equal the total ever endowed.
    pub fn verify_invariants(&self) -> Result<()> {
        let c = &self.components;
        let s = &self.store;

        if !c.token.verify_supply_invariant(s)? {
            return Err(Error::InvariantViolation(
                "token supply differs from the sum of balances".into(),
            ));
        }

        let balance = c.hub.contract_balance(s)?;
        let reserved = c.token.total_reserved(s)?;
        if reserved > balance {
            return Err(Error::InvariantViolation(format!(
                "reserved collateral {} exceeds hub balance {}",
                reserved.wei(),
                balance.wei()
            )));
        }
        let committed = c.hub.committed_collateral(s)?;
        if committed > balance {
            return Err(Error::InvariantViolation(format!(
                "reserves and buy escrow {} exceed hub balance {}",
                committed.wei(),
                balance.wei()
            )));
        }

        let mut held = 0u128;
        for (_, amount) in c.vault.accounts(s)? {
            held = held.checked_add(amount.wei()).ok_or_else(|| Error::Overflow {
                operation: "collateral sum".into(),
            })?;
        }
        let endowed = c.vault.total_endowed(s)?;
        if held != endowed.wei() {
            return Err(Error::InvariantViolation(format!(
                "collateral held {} differs from endowed {}",
                held,
                endowed.wei()
            )));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EVENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Events of every committed operation
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Take the committed events, leaving the log empty
    pub fn drain_events(&mut self) -> EventLog {
        std::mem::take(&mut self.event_log)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// The deployer
    pub fn deployer(&self) -> &Address {
        &self.components.deployer
    }

    /// The oracle callback identity
    pub fn oracle(&self) -> &Address {
        &self.oracle
    }

    /// The hub's identity
    pub fn hub_address(&self) -> &Address {
        self.components.hub.address()
    }

    /// The rewards pool's identity
    pub fn rewards_address(&self) -> &Address {
        self.components.rewards.address()
    }

    /// Active parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.components.params
    }

    /// The underlying store
    pub fn store(&self) -> &LedgerStore<B> {
        &self.store
    }

    /// Epoch schedule, if initialized
    pub fn schedule(&self) -> Result<Option<EpochSchedule>> {
        EpochSchedule::try_load(&self.store)
    }

    /// Token balance of `holder`
    pub fn balance_of(&self, holder: &Address) -> Result<TokenAmount> {
        self.components.token.balance_of(&self.store, holder)
    }

    /// Collateral reserved against `holder`'s tokens
    pub fn reserved_collateral(&self, holder: &Address) -> Result<CollateralAmount> {
        self.components.token.reserved_collateral(&self.store, holder)
    }

    /// Total token supply
    pub fn total_supply(&self) -> Result<TokenAmount> {
        self.components.token.total_supply(&self.store)
    }

    /// Collateral balance of any identity
    pub fn collateral_of(&self, who: &Address) -> Result<CollateralAmount> {
        self.components.vault.balance_of(&self.store, who)
    }

    /// Collateral held by the hub
    pub fn contract_balance(&self) -> Result<CollateralAmount> {
        self.components.hub.contract_balance(&self.store)
    }

    /// Collateral reserved across every holder
    pub fn total_reserved(&self) -> Result<CollateralAmount> {
        self.components.token.total_reserved(&self.store)
    }

    /// Hub balance not committed to reserves or pending buys
    pub fn free_collateral(&self) -> Result<CollateralAmount> {
        self.components.hub.free_collateral(&self.store)
    }

    /// Highest block height committed so far
    pub fn last_block(&self) -> Result<u64> {
        self.store.get_or_default(prefixes::LAST_BLOCK)
    }

    /// Collateral owed to redeem the whole supply at `price`
    pub fn total_outstanding(&self, price: ExchangeRate) -> Result<CollateralAmount> {
        self.components.hub.total_outstanding(&self.store, price)
    }

    /// Contract balance minus total outstanding at `price`
    pub fn buffer(&self, price: ExchangeRate) -> Result<i128> {
        self.components.hub.buffer(&self.store, price)
    }

    /// Current stake of `holder`
    pub fn stake_of(&self, holder: &Address) -> Result<u128> {
        self.components.stake.balance_of(&self.store, holder)
    }

    /// Stake of `holder` as of `block`
    pub fn stake_at(&self, holder: &Address, block: u64) -> Result<u128> {
        self.components.stake.balance_at(&self.store, holder, block)
    }

    /// Epoch containing `block`
    pub fn current_epoch(&self, block: u64) -> Result<u64> {
        self.components.rewards.current_epoch(&self.store, block)
    }

    /// Last epoch observed by a rewards mutation
    pub fn recorded_epoch(&self) -> Result<u64> {
        self.components.rewards.recorded_epoch(&self.store)
    }

    /// Deposits accumulated in `epoch`
    pub fn nth_pool_balance(&self, epoch: u64) -> Result<CollateralAmount> {
        self.components.rewards.nth_pool_balance(&self.store, epoch)
    }

    /// Deposits accumulated in the epoch containing `block`
    pub fn current_pool_balance(&self, block: u64) -> Result<CollateralAmount> {
        self.components.rewards.current_pool_balance(&self.store, block)
    }

    /// First block of `epoch`
    pub fn block_at_epoch_start(&self, epoch: u64) -> Result<u64> {
        self.components.rewards.block_at_epoch_start(&self.store, epoch)
    }

    /// Last epoch `holder` was paid for
    pub fn last_withdrawal_epoch(&self, holder: &Address) -> Result<Option<u64>> {
        self.components.rewards.last_withdrawal_epoch(&self.store, holder)
    }

    /// Preview of a rewards withdrawal at `block`
    pub fn claimable(&self, holder: &Address, block: u64) -> Result<Claim> {
        self.components.rewards.claimable(&self.store, holder, block)
    }

    /// Look up a pending query
    pub fn pending_query(&self, query_id: &QueryId) -> Result<Option<PendingQuery>> {
        self.components.hub.pending_query(&self.store, query_id)
    }

    /// All pending queries
    pub fn pending_queries(&self) -> Result<Vec<PendingQuery>> {
        self.components.hub.pending_queries(&self.store)
    }

    /// Aggregate snapshot at `block`, with derived figures when a price is given
    pub fn status(&self, block: u64, price: Option<ExchangeRate>) -> Result<ProtocolStatus> {
        let schedule = self.schedule()?;
        let (current_epoch, current_pool_balance) = match schedule {
            Some(schedule) => {
                let epoch = schedule.current_epoch(block);
                (Some(epoch), Some(self.nth_pool_balance(epoch)?))
            }
            None => (None, None),
        };
        let (total_outstanding, buffer) = match price {
            Some(price) => (Some(self.total_outstanding(price)?), Some(self.buffer(price)?)),
            None => (None, None),
        };

        Ok(ProtocolStatus {
            block_height: block,
            schedule,
            current_epoch,
            total_supply: self.total_supply()?,
            contract_balance: self.contract_balance()?,
            rewards_balance: self.collateral_of(self.rewards_address())?,
            current_pool_balance,
            pending_queries: self.pending_queries()?.len(),
            price,
            total_outstanding,
            buffer,
        })
    }
}

fn unexpected(result: OperationResult) -> Error {
    Error::Internal(format!("unexpected operation result: {:?}", result))
}

//! Epoch-based rewards pool.
//!
//! Fees are credited to the pool of the epoch in which they arrive. An epoch's
//! pool is sealed once the epoch is over, and only sealed epochs can be
//! claimed, so payouts always lag deposits by at least one epoch.
//!
//! ## Payout
//!
//! For each unclaimed sealed epoch `e`:
//!
//! ```text
//! share(e)  = floor(pool[e] * stake / total_stake)
//! payout   += floor(share(e) * claim_share_bps / 10000)
//! ```
//!
//! The stake figures come from the configured [`StakeBasis`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::StakeBasis;
use crate::core::vault::{CollateralAmount, Vault};
use crate::error::{Error, Result};
use crate::protocol::events::{
    EpochAdvancedEvent, EventLog, ProtocolEvent, RewardsDepositedEvent, RewardsWithdrawnEvent,
};
use crate::rewards::epoch::EpochSchedule;
use crate::rewards::stake::StakeToken;
use crate::storage::{make_key, prefixes, LedgerStore, StorageBackend};
use crate::utils::constants::REWARDS_LABEL;
use crate::utils::crypto::Address;
use crate::utils::math::{bps_of, safe_add, safe_mul_div};

/// Outcome of evaluating a holder's unclaimed epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// First claimable epoch (inclusive)
    pub from_epoch: u64,
    /// Last claimable epoch (inclusive)
    pub to_epoch: u64,
    /// Total payout across the range
    pub amount: CollateralAmount,
}

/// The rewards pool component
#[derive(Debug, Clone)]
pub struct RewardsPool {
    address: Address,
    vault: Vault,
    stake: StakeToken,
    claim_share_bps: u64,
    stake_basis: StakeBasis,
}

impl RewardsPool {
    /// Create the pool over the given collateral and stake ledgers
    pub fn new(vault: Vault, stake: StakeToken, claim_share_bps: u64, stake_basis: StakeBasis) -> Self {
        Self {
            address: Address::derive(REWARDS_LABEL),
            vault,
            stake,
            claim_share_bps,
            stake_basis,
        }
    }

    /// The pool's store identity, which also holds its collateral
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Stake basis used for payouts
    pub fn stake_basis(&self) -> StakeBasis {
        self.stake_basis
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Epoch containing `block`
    pub fn current_epoch<B: StorageBackend>(&self, store: &LedgerStore<B>, block: u64) -> Result<u64> {
        Ok(EpochSchedule::load(store)?.current_epoch(block))
    }

    /// Last epoch observed by a pool mutation
    pub fn recorded_epoch<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<u64> {
        store.get_or_default(prefixes::REWARDS_EPOCH)
    }

    /// First block of `epoch`
    pub fn block_at_epoch_start<B: StorageBackend>(&self, store: &LedgerStore<B>, epoch: u64) -> Result<u64> {
        EpochSchedule::load(store)?.block_at_epoch_start(epoch)
    }

    /// Deposits accumulated in `epoch`
    pub fn nth_pool_balance<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        epoch: u64,
    ) -> Result<CollateralAmount> {
        store.get_or_default(&pool_key(epoch))
    }

    /// Deposits accumulated in the epoch containing `block`
    pub fn current_pool_balance<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        block: u64,
    ) -> Result<CollateralAmount> {
        let epoch = self.current_epoch(store, block)?;
        self.nth_pool_balance(store, epoch)
    }

    /// Last epoch `holder` has been paid for
    pub fn last_withdrawal_epoch<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
    ) -> Result<Option<u64>> {
        store.get(&last_withdrawal_key(holder))
    }

    /// Every epoch with a recorded pool, ascending
    pub fn funded_epochs<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<Vec<u64>> {
        store
            .keys_with_prefix(prefixes::REWARDS_POOL)?
            .iter()
            .map(|key| {
                key.strip_prefix(prefixes::REWARDS_POOL)
                    .and_then(|rest| <[u8; 8]>::try_from(rest).ok())
                    .map(u64::from_be_bytes)
                    .ok_or_else(|| Error::Storage("malformed rewards pool key".into()))
            })
            .collect()
    }

    /// What `holder` would receive by withdrawing at `block`, without side effects
    pub fn claimable<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
        block: u64,
    ) -> Result<Claim> {
        let schedule = EpochSchedule::load(store)?;
        let current = schedule.current_epoch(block);
        let last = self.last_withdrawal_epoch(store, holder)?;
        let first = last.map_or(0, |l| l.saturating_add(1));

        if first >= current {
            return Err(match last {
                Some(last_epoch) => Error::AlreadyWithdrawn { last_epoch },
                None => Error::NothingToClaim,
            });
        }

        let mut amount = 0u128;
        for epoch in self.funded_epochs(store)? {
            if epoch < first || epoch >= current {
                continue;
            }
            let pool = self.nth_pool_balance(store, epoch)?;
            let (stake, total) = self.stake_weights(store, &schedule, holder, epoch, block)?;
            if pool.is_zero() || stake == 0 || total == 0 {
                continue;
            }
            let share = safe_mul_div(pool.wei(), stake, total)?;
            amount = safe_add(amount, bps_of(share, self.claim_share_bps)?)?;
        }

        Ok(Claim {
            from_epoch: first,
            to_epoch: current - 1,
            amount: CollateralAmount::from_wei(amount),
        })
    }

    fn stake_weights<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        schedule: &EpochSchedule,
        holder: &Address,
        epoch: u64,
        block: u64,
    ) -> Result<(u128, u128)> {
        match self.stake_basis {
            StakeBasis::AtWithdrawal => Ok((
                self.stake.balance_at(store, holder, block)?,
                self.stake.total_supply_at(store, block)?,
            )),
            StakeBasis::EpochStart => {
                let start = schedule.block_at_epoch_start(epoch)?;
                Ok((
                    self.stake.balance_at(store, holder, start)?,
                    self.stake.total_supply_at(store, start)?,
                ))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move the recorded epoch up to the epoch containing `block`.
    ///
    /// A block from an epoch before the recorded one is rejected: that epoch
    /// is sealed and may already have been paid out.
    pub fn advance_epoch<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        block: u64,
    ) -> Result<u64> {
        let current = self.current_epoch(store, block)?;
        let recorded = self.recorded_epoch(store)?;
        if current < recorded {
            return Err(Error::InvalidParameter {
                name: "block".into(),
                reason: format!("epoch {} is sealed; recorded epoch is {}", current, recorded),
            });
        }
        if current > recorded {
            store.set(&self.address, prefixes::REWARDS_EPOCH, &current)?;
            events.push(ProtocolEvent::EpochAdvanced(EpochAdvancedEvent {
                previous_epoch: recorded,
                new_epoch: current,
                block_height: block,
            }));
            debug!(from = recorded, to = current, "epoch advanced");
        }
        Ok(current)
    }

    /// Credit `amount` of the caller's collateral to the current epoch pool
    pub fn deposit<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        amount: CollateralAmount,
        block: u64,
    ) -> Result<CollateralAmount> {
        EpochSchedule::load(store)?;
        if amount.is_zero() {
            return Err(Error::ZeroDeposit);
        }

        let epoch = self.advance_epoch(store, events, block)?;
        self.vault.transfer(store, caller, &self.address, amount)?;

        let pool = self
            .nth_pool_balance(store, epoch)?
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: format!("pool of epoch {}", epoch),
            })?;
        store.set(&self.address, &pool_key(epoch), &pool)?;

        events.push(ProtocolEvent::RewardsDeposited(RewardsDepositedEvent {
            funder: *caller,
            epoch,
            amount,
            pool_balance: pool,
            block_height: block,
        }));
        info!(
            funder = %caller.short(),
            epoch,
            amount = amount.wei(),
            "rewards deposited"
        );
        Ok(pool)
    }

    /// Pay `caller` for every unclaimed sealed epoch
    pub fn withdraw<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        events: &mut EventLog,
        caller: &Address,
        block: u64,
    ) -> Result<CollateralAmount> {
        let claim = self.claimable(store, caller, block)?;
        if claim.amount.is_zero() {
            return Err(Error::NothingToClaim);
        }

        self.advance_epoch(store, events, block)?;
        store.set(&self.address, &last_withdrawal_key(caller), &claim.to_epoch)?;
        self.vault.transfer(store, &self.address, caller, claim.amount)?;

        events.push(ProtocolEvent::RewardsWithdrawn(RewardsWithdrawnEvent {
            holder: *caller,
            from_epoch: claim.from_epoch,
            to_epoch: claim.to_epoch,
            amount: claim.amount,
            block_height: block,
        }));
        info!(
            holder = %caller.short(),
            from_epoch = claim.from_epoch,
            to_epoch = claim.to_epoch,
            amount = claim.amount.wei(),
            "rewards withdrawn"
        );
        Ok(claim.amount)
    }
}

fn pool_key(epoch: u64) -> Vec<u8> {
    make_key(prefixes::REWARDS_POOL, &epoch.to_be_bytes())
}

fn last_withdrawal_key(holder: &Address) -> Vec<u8> {
    make_key(prefixes::REWARDS_LAST_WITHDRAWAL, holder.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    struct Fixture {
        store: LedgerStore<InMemoryStore>,
        pool: RewardsPool,
        vault: Vault,
        stake: StakeToken,
        deployer: Address,
        fund: Address,
        wallet: Address,
    }

    fn setup(basis: StakeBasis) -> Fixture {
        let deployer = Address::derive("deployer");
        let fund = Address::derive("fund");
        let wallet = Address::derive("wallet");
        let store = LedgerStore::new(InMemoryStore::new(), deployer);
        let vault = Vault::new(deployer);
        let stake = StakeToken::new(deployer);
        let pool = RewardsPool::new(vault.clone(), stake.clone(), 5_000, basis);

        for identity in [vault.address(), stake.address(), pool.address(), &deployer] {
            store.authorize(&deployer, identity).unwrap();
        }
        stake.mint(&store, &deployer, &fund, 500, 0).unwrap();
        stake.mint(&store, &deployer, &wallet, 500, 0).unwrap();
        vault
            .endow(&store, &deployer, &deployer, CollateralAmount::from_ether(10))
            .unwrap();
        EpochSchedule::new(10, 20).unwrap().save(&store, &deployer).unwrap();

        Fixture {
            store,
            pool,
            vault,
            stake,
            deployer,
            fund,
            wallet,
        }
    }

    #[test]
    fn test_deposit_credits_current_epoch() {
        let f = setup(StakeBasis::AtWithdrawal);
        let mut events = EventLog::new();

        f.pool
            .deposit(&f.store, &mut events, &f.deployer, CollateralAmount::from_ether(1), 12)
            .unwrap();

        assert_eq!(f.pool.nth_pool_balance(&f.store, 0).unwrap().wei(), ETHER);
        assert_eq!(f.pool.current_pool_balance(&f.store, 29).unwrap().wei(), ETHER);
        assert!(f.pool.current_pool_balance(&f.store, 30).unwrap().is_zero());
        assert_eq!(f.vault.balance_of(&f.store, f.pool.address()).unwrap().wei(), ETHER);
        assert_eq!(events.filter_by_type("RewardsDeposited").len(), 1);
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let f = setup(StakeBasis::AtWithdrawal);
        let mut events = EventLog::new();
        let err = f
            .pool
            .deposit(&f.store, &mut events, &f.deployer, CollateralAmount::ZERO, 12)
            .unwrap_err();
        assert_eq!(err, Error::ZeroDeposit);
    }

    #[test]
    fn test_deposit_advances_epoch() {
        let f = setup(StakeBasis::AtWithdrawal);
        let mut events = EventLog::new();
        f.pool
            .deposit(&f.store, &mut events, &f.deployer, CollateralAmount::from_wei(1), 55)
            .unwrap();

        assert_eq!(f.pool.recorded_epoch(&f.store).unwrap(), 2);
        assert_eq!(events.filter_by_type("EpochAdvanced").len(), 1);
    }

    #[test]
    fn test_withdraw_lags_one_epoch() {
        let f = setup(StakeBasis::AtWithdrawal);
        let mut events = EventLog::new();
        f.pool
            .deposit(&f.store, &mut events, &f.deployer, CollateralAmount::from_ether(1), 12)
            .unwrap();

        // Epoch 0 is still open
        assert_eq!(
            f.pool.withdraw(&f.store, &mut events, &f.wallet, 29),
            Err(Error::NothingToClaim)
        );

        let paid = f.pool.withdraw(&f.store, &mut events, &f.wallet, 30).unwrap();
        assert_eq!(paid.wei(), ETHER / 4);
        assert_eq!(f.vault.balance_of(&f.store, &f.wallet).unwrap().wei(), ETHER / 4);
        assert_eq!(f.pool.last_withdrawal_epoch(&f.store, &f.wallet).unwrap(), Some(0));

        assert_eq!(
            f.pool.withdraw(&f.store, &mut events, &f.wallet, 40),
            Err(Error::AlreadyWithdrawn { last_epoch: 0 })
        );
    }

    #[test]
    fn test_sealed_epoch_refuses_late_deposit() {
        let f = setup(StakeBasis::AtWithdrawal);
        let mut events = EventLog::new();
        let one = CollateralAmount::from_ether(1);
        f.pool.deposit(&f.store, &mut events, &f.deployer, one, 15).unwrap();
        let paid = f.pool.withdraw(&f.store, &mut events, &f.wallet, 35).unwrap();
        assert_eq!(paid.wei(), ETHER / 4);

        // Crossing into epoch 2 seals epoch 1 as well
        f.pool.deposit(&f.store, &mut events, &f.deployer, one, 55).unwrap();
        assert_eq!(f.pool.recorded_epoch(&f.store).unwrap(), 2);

        for block in [13, 35] {
            let err = f
                .pool
                .deposit(&f.store, &mut events, &f.deployer, one, block)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "block"));
        }
        assert_eq!(f.pool.nth_pool_balance(&f.store, 0).unwrap().wei(), ETHER);
        assert!(f.pool.nth_pool_balance(&f.store, 1).unwrap().is_zero());
        assert_eq!(f.pool.nth_pool_balance(&f.store, 2).unwrap().wei(), ETHER);

        // A withdrawal at a stale block is refused too
        assert!(matches!(
            f.pool.withdraw(&f.store, &mut events, &f.fund, 45),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_withdraw_without_pool_is_nothing_to_claim() {
        let f = setup(StakeBasis::AtWithdrawal);
        let mut events = EventLog::new();
        assert_eq!(
            f.pool.withdraw(&f.store, &mut events, &f.fund, 100),
            Err(Error::NothingToClaim)
        );
        assert_eq!(f.pool.last_withdrawal_epoch(&f.store, &f.fund).unwrap(), None);
    }

    #[test]
    fn test_stake_basis_changes_weights() {
        for (basis, expected) in [
            (StakeBasis::AtWithdrawal, ETHER / 4),
            (StakeBasis::EpochStart, ETHER / 4 + ETHER / 8),
        ] {
            let f = setup(basis);
            let mut events = EventLog::new();
            f.pool
                .deposit(&f.store, &mut events, &f.deployer, CollateralAmount::from_ether(1), 12)
                .unwrap();
            f.stake.transfer(&f.store, &f.wallet, &f.fund, 250, 15).unwrap();
            f.pool
                .deposit(&f.store, &mut events, &f.deployer, CollateralAmount::from_ether(1), 35)
                .unwrap();

            // AtWithdrawal: 250/1000 of each pool, halved
            // EpochStart: 500/1000 of epoch 0 and 250/1000 of epoch 1, halved
            let paid = f.pool.withdraw(&f.store, &mut events, &f.wallet, 50).unwrap();
            assert_eq!(paid.wei(), expected, "basis {:?}", basis);
        }
    }

    #[test]
    fn test_not_initialized() {
        let deployer = Address::derive("deployer");
        let store = LedgerStore::new(InMemoryStore::new(), deployer);
        let pool = RewardsPool::new(
            Vault::new(deployer),
            StakeToken::new(deployer),
            5_000,
            StakeBasis::AtWithdrawal,
        );
        let mut events = EventLog::new();
        assert_eq!(
            pool.deposit(&store, &mut events, &deployer, CollateralAmount::from_wei(1), 0),
            Err(Error::NotInitialized)
        );
    }
}

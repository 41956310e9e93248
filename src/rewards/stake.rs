//! Stake token.
//!
//! Stake balances weight each holder's share of the rewards pool. Every
//! balance change is checkpointed by block so past balances stay readable.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{address_suffix, make_key, prefixes, LedgerStore, StorageBackend};
use crate::utils::constants::STAKE_LABEL;
use crate::utils::crypto::Address;

/// Balance history as `(block, balance after that block)`, ascending by block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoints(Vec<(u64, u128)>);

impl Checkpoints {
    /// Balance after every change at blocks `<= block`
    pub fn value_at(&self, block: u64) -> u128 {
        let idx = self.0.partition_point(|(b, _)| *b <= block);
        if idx == 0 {
            0
        } else {
            self.0[idx - 1].1
        }
    }

    /// Latest recorded value
    pub fn latest(&self) -> u128 {
        self.0.last().map(|(_, v)| *v).unwrap_or(0)
    }

    /// Record `value` at `block`, overwriting a same-block entry
    pub fn record(&mut self, block: u64, value: u128) -> Result<()> {
        match self.0.last_mut() {
            Some((last, v)) if *last == block => {
                *v = value;
                return Ok(());
            }
            Some((last, _)) if *last > block => {
                return Err(Error::InvalidParameter {
                    name: "block_height".into(),
                    reason: format!("block {} precedes stake checkpoint at {}", block, last),
                });
            }
            _ => {}
        }
        self.0.push((block, value));
        Ok(())
    }

    /// Number of checkpoints
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was ever recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The stake token ledger
#[derive(Debug, Clone)]
pub struct StakeToken {
    address: Address,
    minter: Address,
}

impl StakeToken {
    /// Create the ledger; `minter` is the only identity allowed to mint
    pub fn new(minter: Address) -> Self {
        Self {
            address: Address::derive(STAKE_LABEL),
            minter,
        }
    }

    /// The ledger's store identity
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current stake of `holder`
    pub fn balance_of<B: StorageBackend>(&self, store: &LedgerStore<B>, holder: &Address) -> Result<u128> {
        Ok(self.holder_checkpoints(store, holder)?.latest())
    }

    /// Stake of `holder` as of `block`
    pub fn balance_at<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
        block: u64,
    ) -> Result<u128> {
        Ok(self.holder_checkpoints(store, holder)?.value_at(block))
    }

    /// Current total stake
    pub fn total_supply<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<u128> {
        Ok(self.supply_checkpoints(store)?.latest())
    }

    /// Total stake as of `block`
    pub fn total_supply_at<B: StorageBackend>(&self, store: &LedgerStore<B>, block: u64) -> Result<u128> {
        Ok(self.supply_checkpoints(store)?.value_at(block))
    }

    /// Every address that ever held stake
    pub fn holders<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<Vec<Address>> {
        store
            .keys_with_prefix(prefixes::STAKE_CHECKPOINTS)?
            .iter()
            .map(|key| address_suffix(key, prefixes::STAKE_CHECKPOINTS))
            .collect()
    }

    /// Create `amount` of stake for `to`. Minter only.
    pub fn mint<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        to: &Address,
        amount: u128,
        block: u64,
    ) -> Result<()> {
        if caller != &self.minter {
            return Err(Error::Unauthorized(format!("{} cannot mint stake", caller.short())));
        }
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let mut holder = self.holder_checkpoints(store, to)?;
        let mut supply = self.supply_checkpoints(store)?;
        let new_balance = checked_add(holder.latest(), amount)?;
        let new_supply = checked_add(supply.latest(), amount)?;
        holder.record(block, new_balance)?;
        supply.record(block, new_supply)?;

        store.set(&self.address, &checkpoint_key(to), &holder)?;
        store.set(&self.address, prefixes::STAKE_SUPPLY, &supply)?;
        debug!(to = %to.short(), amount, block, "stake minted");
        Ok(())
    }

    /// Move `amount` of the caller's stake to `to`
    pub fn transfer<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        to: &Address,
        amount: u128,
        block: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let mut from_ckpt = self.holder_checkpoints(store, caller)?;
        let balance = from_ckpt.latest();
        if balance < amount {
            return Err(Error::insufficient("stake", amount, balance));
        }
        if caller == to {
            return Ok(());
        }
        let mut to_ckpt = self.holder_checkpoints(store, to)?;
        let credited = checked_add(to_ckpt.latest(), amount)?;
        from_ckpt.record(block, balance - amount)?;
        to_ckpt.record(block, credited)?;

        store.set(&self.address, &checkpoint_key(caller), &from_ckpt)?;
        store.set(&self.address, &checkpoint_key(to), &to_ckpt)?;
        debug!(from = %caller.short(), to = %to.short(), amount, block, "stake transferred");
        Ok(())
    }

    fn holder_checkpoints<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
    ) -> Result<Checkpoints> {
        store.get_or_default(&checkpoint_key(holder))
    }

    fn supply_checkpoints<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<Checkpoints> {
        store.get_or_default(prefixes::STAKE_SUPPLY)
    }
}

fn checkpoint_key(holder: &Address) -> Vec<u8> {
    make_key(prefixes::STAKE_CHECKPOINTS, holder.as_bytes())
}

fn checked_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or_else(|| Error::Overflow {
        operation: "stake balance".into(),
    })
}

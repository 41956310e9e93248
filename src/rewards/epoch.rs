//! Epoch schedule.
//!
//! Epochs are implicit: they are derived from the block height, the block at
//! which the protocol was initialized, and a fixed epoch length.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{prefixes, LedgerStore, StorageBackend};
use crate::utils::crypto::Address;

/// Creation block and epoch length, written once by `initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSchedule {
    /// Block at which epoch 0 begins
    pub creation_block: u64,
    /// Length of every epoch in blocks
    pub blocks_per_epoch: u64,
}

impl EpochSchedule {
    /// Create a schedule, rejecting zero-length epochs
    pub fn new(creation_block: u64, blocks_per_epoch: u64) -> Result<Self> {
        if blocks_per_epoch == 0 {
            return Err(Error::InvalidParameter {
                name: "blocks_per_epoch".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            creation_block,
            blocks_per_epoch,
        })
    }

    /// Epoch containing `block`. Blocks before creation belong to epoch 0.
    pub fn current_epoch(&self, block: u64) -> u64 {
        block.saturating_sub(self.creation_block) / self.blocks_per_epoch
    }

    /// First block of `epoch`
    pub fn block_at_epoch_start(&self, epoch: u64) -> Result<u64> {
        epoch
            .checked_mul(self.blocks_per_epoch)
            .and_then(|offset| offset.checked_add(self.creation_block))
            .ok_or_else(|| Error::Overflow {
                operation: format!("start block of epoch {}", epoch),
            })
    }

    /// Read the stored schedule, if the protocol was initialized
    pub fn try_load<B: StorageBackend>(store: &LedgerStore<B>) -> Result<Option<Self>> {
        store.get(prefixes::EPOCH_SCHEDULE)
    }

    /// Read the stored schedule
    pub fn load<B: StorageBackend>(store: &LedgerStore<B>) -> Result<Self> {
        Self::try_load(store)?.ok_or(Error::NotInitialized)
    }

    /// Persist the schedule. Fails if one is already stored.
    pub fn save<B: StorageBackend>(&self, store: &LedgerStore<B>, writer: &Address) -> Result<()> {
        if Self::try_load(store)?.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        store.set(writer, prefixes::EPOCH_SCHEDULE, self)
    }
}

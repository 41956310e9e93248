//! Access-controlled ledger store.
//!
//! A capability-gated key/value map shared by every component. Reads are
//! unrestricted; writes require the caller to be in the authorization set,
//! which only the store owner (the deployer) can extend.
//!
//! All writes made inside [`LedgerStore::atomic`] are staged and either
//! committed together or discarded together, which is what makes every
//! public protocol operation abort-and-revert.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::backend::{make_key, prefixes, StorageBackend, StorageKey, StorageValue};
use crate::utils::constants::ADDRESS_LENGTH;
use crate::utils::crypto::Address;

type Batch = BTreeMap<StorageKey, Option<StorageValue>>;

/// Authorized, typed, transactional view over a [`StorageBackend`]
pub struct LedgerStore<B: StorageBackend> {
    backend: B,
    owner: Address,
    batch: RwLock<Option<Batch>>,
}

impl<B: StorageBackend> LedgerStore<B> {
    /// Wrap a backend; `owner` is the only identity allowed to grant write access
    pub fn new(backend: B, owner: Address) -> Self {
        Self {
            backend,
            owner,
            batch: RwLock::new(None),
        }
    }

    /// The store owner
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Get the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AUTHORIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Grant write access to `identity`. Owner only, idempotent.
    pub fn authorize(&self, caller: &Address, identity: &Address) -> Result<()> {
        if caller != &self.owner {
            return Err(Error::Unauthorized(format!(
                "{} cannot grant store access",
                caller.short()
            )));
        }
        let key = make_key(prefixes::AUTH, identity.as_bytes());
        if self.raw_get(&key)?.is_some() {
            return Ok(());
        }
        self.raw_put(key, Some(encode(&true)?))?;
        debug!(identity = %identity, "store access granted");
        Ok(())
    }

    /// Whether `identity` may write
    pub fn is_authorized(&self, identity: &Address) -> Result<bool> {
        let key = make_key(prefixes::AUTH, identity.as_bytes());
        Ok(self.raw_get(&key)?.is_some())
    }

    fn ensure_authorized(&self, caller: &Address) -> Result<()> {
        if self.is_authorized(caller)? {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} has no store write access",
                caller.short()
            )))
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.raw_get(key)? {
            Some(data) => decode(&data).map(Some),
            None => Ok(None),
        }
    }

    /// Get a typed value, or its default when absent
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &[u8]) -> Result<T> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Sorted keys under `prefix`, including writes staged in the open batch
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let mut keys: BTreeSet<StorageKey> = self.backend.list_prefix(prefix)?.into_iter().collect();
        let batch = self.batch.read().map_err(lock_error)?;
        if let Some(staged) = batch.as_ref() {
            for (key, value) in staged.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                if value.is_some() {
                    keys.insert(key.clone());
                } else {
                    keys.remove(key);
                }
            }
        }
        Ok(keys.into_iter().collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WRITES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Set a typed value. Caller must be authorized.
    pub fn set<T: Serialize>(&self, caller: &Address, key: &[u8], value: &T) -> Result<()> {
        self.ensure_authorized(caller)?;
        self.raw_put(key.to_vec(), Some(encode(value)?))
    }

    /// Delete a key. Caller must be authorized.
    pub fn delete(&self, caller: &Address, key: &[u8]) -> Result<bool> {
        self.ensure_authorized(caller)?;
        let existed = self.raw_get(key)?.is_some();
        if existed {
            self.raw_put(key.to_vec(), None)?;
        }
        Ok(existed)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSACTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run `f` with every write staged; commit on `Ok`, discard on `Err`.
    ///
    /// Taking `&mut self` guarantees no other operation runs until this one
    /// has committed or rolled back.
    pub fn atomic<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        *self.batch.get_mut().map_err(lock_error)? = Some(Batch::new());

        let outcome = f(self);

        let staged = self
            .batch
            .get_mut()
            .map_err(lock_error)?
            .take()
            .unwrap_or_default();

        match outcome {
            Ok(value) => {
                let writes = staged.len();
                self.backend.apply_batch(staged.into_iter().collect())?;
                self.backend.flush()?;
                debug!(writes, "ledger batch committed");
                Ok(value)
            }
            Err(e) => {
                debug!(discarded = staged.len(), error = %e, "ledger batch rolled back");
                Err(e)
            }
        }
    }

    /// Whether a batch is currently open
    pub fn in_batch(&self) -> bool {
        self.batch.read().map(|b| b.is_some()).unwrap_or(false)
    }

    fn raw_get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        {
            let batch = self.batch.read().map_err(lock_error)?;
            if let Some(staged) = batch.as_ref().and_then(|b| b.get(key)) {
                return Ok(staged.clone());
            }
        }
        self.backend.get(key)
    }

    fn raw_put(&self, key: StorageKey, value: Option<StorageValue>) -> Result<()> {
        {
            let mut batch = self.batch.write().map_err(lock_error)?;
            if let Some(staged) = batch.as_mut() {
                staged.insert(key, value);
                return Ok(());
            }
        }
        self.backend.apply_batch(vec![(key, value)])?;
        self.backend.flush()
    }
}

/// Recover the address encoded after `prefix` in a per-account key
pub fn address_suffix(key: &[u8], prefix: &[u8]) -> Result<Address> {
    key.strip_prefix(prefix)
        .and_then(|rest| <[u8; ADDRESS_LENGTH]>::try_from(rest).ok())
        .map(Address::new)
        .ok_or_else(|| Error::Storage(format!("malformed account key: {}", hex::encode(key))))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| Error::Serialization(format!("Failed to serialize value: {}", e)))
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    bincode::deserialize(data)
        .map_err(|e| Error::Deserialization(format!("Failed to deserialize value: {}", e)))
}

fn lock_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(format!("Lock error: {}", e))
}

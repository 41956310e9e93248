//! Storage backend implementations.
//!
//! This module provides different storage backends:
//! - InMemoryStore: Fast, ephemeral storage for tests and simulations
//! - FileStore: JSON file with hex-encoded keys and values
//! - BinaryStore: Compact bincode file
//! - DiskStore: Either file store, picked by [`FileEncoding`] at open time
//!
//! Backends are raw byte maps. Typing, authorization and atomicity live in
//! [`crate::storage::LedgerStore`].

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Key type for storage operations
pub type StorageKey = Vec<u8>;

/// Value type for storage operations
pub type StorageValue = Vec<u8>;

/// A staged write: `Some(value)` sets the key, `None` deletes it
pub type BatchOp = (StorageKey, Option<StorageValue>);

/// Trait for storage backends
pub trait StorageBackend: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>>;

    /// Set a value for a key
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// List all keys with a given prefix
    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>>;

    /// Flush any pending writes to persistent storage
    fn flush(&self) -> Result<()>;

    /// Apply a batch of writes in order
    fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        for (key, value) in ops {
            match value {
                Some(value) => self.set(&key, &value)?,
                None => {
                    self.delete(&key)?;
                }
            }
        }
        Ok(())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(format!("Lock error: {}", e))
}

fn prefixed_keys(map: &HashMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<StorageKey> {
    let mut keys: Vec<StorageKey> = map
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect();
    keys.sort();
    keys
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(lock_error)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut data = self.data.write().map_err(lock_error)?;
        Ok(data.remove(key).is_some())
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.contains_key(key))
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(prefixed_keys(&data, prefix))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CACHED FILE STORES
// ═══════════════════════════════════════════════════════════════════════════════

/// On-disk encoding used by a [`CachedFileStore`]
pub trait FileFormat: Send + Sync {
    /// File name inside the store directory
    const FILE_NAME: &'static str;

    /// Decode the whole map from the file contents
    fn decode(bytes: &[u8]) -> Result<HashMap<Vec<u8>, Vec<u8>>>;

    /// Encode the whole map into file contents
    fn encode(map: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Vec<u8>>;
}

/// JSON encoding with hex keys and values (human-inspectable)
#[derive(Debug)]
pub struct JsonFormat;

impl FileFormat for JsonFormat {
    const FILE_NAME: &'static str = "ledger.json";

    fn decode(bytes: &[u8]) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let data: BTreeMap<String, String> = serde_json::from_slice(bytes)
            .map_err(|e| Error::Storage(format!("Failed to parse data file: {}", e)))?;

        let mut map = HashMap::with_capacity(data.len());
        for (key_hex, value_hex) in data {
            let key = hex::decode(&key_hex)
                .map_err(|e| Error::Storage(format!("Invalid key in storage: {}", e)))?;
            let value = hex::decode(&value_hex)
                .map_err(|e| Error::Storage(format!("Invalid value in storage: {}", e)))?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn encode(map: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Vec<u8>> {
        let data: BTreeMap<String, String> = map
            .iter()
            .map(|(k, v)| (hex::encode(k), hex::encode(v)))
            .collect();
        serde_json::to_vec_pretty(&data)
            .map_err(|e| Error::Storage(format!("Failed to encode data file: {}", e)))
    }
}

/// Compact bincode encoding
#[derive(Debug)]
pub struct BincodeFormat;

impl FileFormat for BincodeFormat {
    const FILE_NAME: &'static str = "ledger.bin";

    fn decode(bytes: &[u8]) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::Storage(format!("Failed to deserialize data: {}", e)))
    }

    fn encode(map: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Vec<u8>> {
        bincode::serialize(map).map_err(|e| Error::Storage(format!("Failed to serialize data: {}", e)))
    }
}

/// File-backed store: an in-memory cache persisted as a single file on flush
#[derive(Debug)]
pub struct CachedFileStore<F: FileFormat> {
    /// Base directory for storage
    base_path: PathBuf,
    /// In-memory cache
    cache: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    /// Whether cache is dirty and needs flushing
    dirty: RwLock<bool>,
    format: std::marker::PhantomData<F>,
}

/// JSON file store
pub type FileStore = CachedFileStore<JsonFormat>;

/// Bincode file store
pub type BinaryStore = CachedFileStore<BincodeFormat>;

impl<F: FileFormat> CachedFileStore<F> {
    /// Open (or create) a store in the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                Error::Storage(format!("Failed to create storage directory: {}", e))
            })?;
        }

        let store = Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
            dirty: RwLock::new(false),
            format: std::marker::PhantomData,
        };

        store.load_from_disk()?;

        Ok(store)
    }

    /// Path of the data file
    pub fn data_file_path(&self) -> PathBuf {
        self.base_path.join(F::FILE_NAME)
    }

    fn load_from_disk(&self) -> Result<()> {
        let path = self.data_file_path();

        if !path.exists() {
            return Ok(());
        }

        let file = File::open(&path)
            .map_err(|e| Error::Storage(format!("Failed to open data file: {}", e)))?;
        let mut data = Vec::new();
        BufReader::new(file)
            .read_to_end(&mut data)
            .map_err(|e| Error::Storage(format!("Failed to read data file: {}", e)))?;

        let loaded = F::decode(&data)?;
        let mut cache = self.cache.write().map_err(lock_error)?;
        *cache = loaded;

        Ok(())
    }

    fn save_to_disk(&self) -> Result<()> {
        let data = {
            let cache = self.cache.read().map_err(lock_error)?;
            F::encode(&cache)?
        };

        let path = self.data_file_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("Failed to open data file for writing: {}", e)))?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(&data)
            .and_then(|_| writer.flush())
            .map_err(|e| Error::Storage(format!("Failed to write data file: {}", e)))?;

        let mut dirty = self.dirty.write().map_err(lock_error)?;
        *dirty = false;

        Ok(())
    }

    fn mark_dirty(&self) -> Result<()> {
        let mut dirty = self.dirty.write().map_err(lock_error)?;
        *dirty = true;
        Ok(())
    }
}

impl<F: FileFormat> StorageBackend for CachedFileStore<F> {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(cache.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        {
            let mut cache = self.cache.write().map_err(lock_error)?;
            cache.insert(key.to_vec(), value.to_vec());
        }
        self.mark_dirty()
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let existed = {
            let mut cache = self.cache.write().map_err(lock_error)?;
            cache.remove(key).is_some()
        };
        if existed {
            self.mark_dirty()?;
        }
        Ok(existed)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(cache.contains_key(key))
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(prefixed_keys(&cache, prefix))
    }

    fn flush(&self) -> Result<()> {
        let dirty = *self.dirty.read().map_err(lock_error)?;
        if dirty {
            self.save_to_disk()?;
        }
        Ok(())
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        {
            let mut cache = self.cache.write().map_err(lock_error)?;
            for (key, value) in ops {
                match value {
                    Some(value) => {
                        cache.insert(key, value);
                    }
                    None => {
                        cache.remove(&key);
                    }
                }
            }
        }
        self.mark_dirty()
    }
}

impl<F: FileFormat> Drop for CachedFileStore<F> {
    fn drop(&mut self) {
        // Best effort; explicit flushes happen on every committed batch.
        let _ = self.flush();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISK STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// On-disk encoding of a ledger directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    /// `ledger.json`
    #[default]
    Json,
    /// `ledger.bin`
    Bincode,
}

impl std::str::FromStr for FileEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "bincode" | "binary" => Ok(Self::Bincode),
            other => Err(Error::InvalidParameter {
                name: "storage".into(),
                reason: format!("unknown encoding '{}'", other),
            }),
        }
    }
}

/// A file store of either encoding
#[derive(Debug)]
pub enum DiskStore {
    /// JSON file store
    Json(FileStore),
    /// Bincode file store
    Bincode(BinaryStore),
}

impl DiskStore {
    /// Open (or create) a store in `path` with the given encoding
    pub fn open<P: AsRef<Path>>(path: P, encoding: FileEncoding) -> Result<Self> {
        Ok(match encoding {
            FileEncoding::Json => Self::Json(FileStore::new(path)?),
            FileEncoding::Bincode => Self::Bincode(BinaryStore::new(path)?),
        })
    }

    /// Path of the data file
    pub fn data_file_path(&self) -> PathBuf {
        match self {
            Self::Json(store) => store.data_file_path(),
            Self::Bincode(store) => store.data_file_path(),
        }
    }

    fn inner(&self) -> &dyn StorageBackend {
        match self {
            Self::Json(store) => store,
            Self::Bincode(store) => store,
        }
    }
}

impl StorageBackend for DiskStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        self.inner().get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner().set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        self.inner().delete(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        self.inner().exists(key)
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        self.inner().list_prefix(prefix)
    }

    fn flush(&self) -> Result<()> {
        self.inner().flush()
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        self.inner().apply_batch(ops)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY PREFIXES
// ═══════════════════════════════════════════════════════════════════════════════

/// Key prefixes, one namespace per component
pub mod prefixes {
    /// Store authorization set
    pub const AUTH: &[u8] = b"auth:";
    /// Collateral vault balances
    pub const VAULT_BALANCE: &[u8] = b"vault:bal:";
    /// Collateral vault endowment total
    pub const VAULT_ENDOWED: &[u8] = b"vault:endowed";
    /// Stake token balance checkpoints
    pub const STAKE_CHECKPOINTS: &[u8] = b"stk:ckpt:";
    /// Stake token total supply checkpoints
    pub const STAKE_SUPPLY: &[u8] = b"stk:supply";
    /// Synthetic token balances
    pub const TOKEN_BALANCE: &[u8] = b"tok:bal:";
    /// Synthetic token reserved collateral
    pub const TOKEN_RESERVED: &[u8] = b"tok:res:";
    /// Synthetic token total supply
    pub const TOKEN_SUPPLY: &[u8] = b"tok:supply";
    /// Synthetic token authorization set
    pub const TOKEN_AUTH: &[u8] = b"tok:auth:";
    /// Rewards pool per-epoch balances
    pub const REWARDS_POOL: &[u8] = b"rwd:pool:";
    /// Rewards pool per-holder last withdrawal epoch
    pub const REWARDS_LAST_WITHDRAWAL: &[u8] = b"rwd:last:";
    /// Rewards pool recorded epoch
    pub const REWARDS_EPOCH: &[u8] = b"rwd:epoch";
    /// Epoch schedule written by initialization
    pub const EPOCH_SCHEDULE: &[u8] = b"sys:schedule";
    /// Highest block height committed by a timed operation
    pub const LAST_BLOCK: &[u8] = b"sys:block";
    /// Hub query nonce
    pub const HUB_NONCE: &[u8] = b"hub:nonce";
    /// Hub pending queries
    pub const HUB_QUERY: &[u8] = b"hub:query:";
}

/// Create a key with a prefix
pub fn make_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(prefix.len() + key.len());
    result.extend_from_slice(prefix);
    result.extend_from_slice(key);
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

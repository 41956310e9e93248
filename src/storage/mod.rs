//! Storage layer for the cryptofiat protocol.
//!
//! - `backend`: raw byte-map backends (memory, JSON file, bincode file)
//! - `ledger_store`: the shared, authorization-gated, transactional store

pub mod backend;
pub mod ledger_store;

pub use backend::{
    make_key, prefixes, BinaryStore, DiskStore, FileEncoding, FileStore, InMemoryStore,
    StorageBackend, StorageKey, StorageValue,
};
pub use ledger_store::{address_suffix, LedgerStore};

//! # CryptoFiat Protocol
//!
//! A fiat-pegged token backed by a native collateral asset. Collateral is
//! paid into a hub, an oracle delivers the exchange rate asynchronously, and
//! tokens are issued or redeemed at that rate. Each buy pays a rewards fee
//! that stake holders claim per epoch.
//!
//! ## Architecture
//!
//! - **Core**: Collateral vault, synthetic token and parameters
//! - **Protocol**: Hub, pending price queries and the atomic facade
//! - **Rewards**: Epoch schedule, stake checkpoints and fee pools
//! - **Storage**: Authorization-gated transactional ledger over pluggable backends
//!
//! ## Example
//!
//! ```rust,ignore
//! use cryptofiat::prelude::*;
//!
//! let deployer = Address::derive("deployer");
//! let oracle = Address::derive("oracle");
//! let mut protocol = Protocol::deploy(InMemoryStore::new(), deployer, oracle, ProtocolParams::default())?;
//!
//! protocol.initialize(&deployer, 5_760, 0)?;
//! let query = protocol.buy(&alice, CollateralAmount::from_ether(1), 1)?;
//! protocol.settle(&oracle, &query, ExchangeRate::from_cents_per_ether(100_000), 2)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod cli;
pub mod core;
pub mod error;
pub mod protocol;
pub mod rewards;
pub mod storage;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::{ProtocolParams, StakeBasis},
        token::{ExchangeRate, SyntheticToken, TokenAmount},
        vault::{CollateralAmount, Vault},
    };
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{
        EventLog, OperationResult, PendingQuery, Protocol, ProtocolEvent, ProtocolOperation,
        ProtocolStatus, QueryKind, Settlement,
    };
    pub use crate::rewards::{EpochSchedule, RewardsPool, StakeToken};
    pub use crate::storage::{FileStore, InMemoryStore, LedgerStore, StorageBackend};
    pub use crate::utils::crypto::{Address, QueryId};
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "CryptoFiat";

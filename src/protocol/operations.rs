//! Protocol operations.
//!
//! Every mutating entry point is expressed as a [`ProtocolOperation`], so it
//! can be executed atomically, logged, and driven from the command line.

use serde::{Deserialize, Serialize};

use crate::core::token::{ExchangeRate, TokenAmount};
use crate::core::vault::CollateralAmount;
use crate::protocol::hub::Settlement;
use crate::rewards::EpochSchedule;
use crate::utils::crypto::{Address, QueryId};

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A state-changing request, executed on behalf of an explicit caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProtocolOperation {
    /// Start the epoch clock
    Initialize {
        /// Epoch length; the configured default when absent
        blocks_per_epoch: Option<u64>,
    },
    /// Grant store write access
    AuthorizeStore {
        /// Identity to authorize
        identity: Address,
    },
    /// Grant token mint/burn rights
    AuthorizeMinter {
        /// Identity to authorize
        identity: Address,
    },
    /// Credit genesis collateral
    Endow {
        /// Recipient
        to: Address,
        /// Amount in wei
        amount: CollateralAmount,
    },
    /// Add collateral to the buffer
    Capitalize {
        /// Amount in wei
        amount: CollateralAmount,
    },
    /// Pay collateral in for tokens
    Buy {
        /// Payment in wei
        payment: CollateralAmount,
    },
    /// Offer tokens for collateral
    Sell {
        /// Tokens in cents
        amount: TokenAmount,
    },
    /// Deliver the price for a pending query
    Settle {
        /// Query being answered
        query_id: QueryId,
        /// Cents per ether
        price: ExchangeRate,
    },
    /// Drop an unanswered query
    ExpireQuery {
        /// Query to expire
        query_id: QueryId,
    },
    /// Fund the current epoch pool
    DepositRewards {
        /// Amount in wei
        amount: CollateralAmount,
    },
    /// Claim sealed epochs
    WithdrawRewards,
    /// Create stake
    MintStake {
        /// Recipient
        to: Address,
        /// Stake units
        amount: u128,
    },
    /// Move the caller's stake
    TransferStake {
        /// Recipient
        to: Address,
        /// Stake units
        amount: u128,
    },
}

impl ProtocolOperation {
    /// Get the operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "Initialize",
            Self::AuthorizeStore { .. } => "AuthorizeStore",
            Self::AuthorizeMinter { .. } => "AuthorizeMinter",
            Self::Endow { .. } => "Endow",
            Self::Capitalize { .. } => "Capitalize",
            Self::Buy { .. } => "Buy",
            Self::Sell { .. } => "Sell",
            Self::Settle { .. } => "Settle",
            Self::ExpireQuery { .. } => "ExpireQuery",
            Self::DepositRewards { .. } => "DepositRewards",
            Self::WithdrawRewards => "WithdrawRewards",
            Self::MintStake { .. } => "MintStake",
            Self::TransferStake { .. } => "TransferStake",
        }
    }

    /// Whether the operation acts at a block height. Grants and endowments
    /// are not tied to the block clock.
    pub fn is_timed(&self) -> bool {
        !matches!(
            self,
            Self::AuthorizeStore { .. } | Self::AuthorizeMinter { .. } | Self::Endow { .. }
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of an executed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "data", rename_all = "snake_case")]
pub enum OperationResult {
    /// Epoch clock started
    Initialized(EpochSchedule),
    /// Access granted (or already held)
    Authorized,
    /// Collateral credited; new balance of the recipient
    Endowed(CollateralAmount),
    /// Buffer grown; new hub balance
    Capitalized(CollateralAmount),
    /// Price query recorded
    QueryCreated(QueryId),
    /// Query settled
    Settled(Settlement),
    /// Query expired; collateral refunded
    Expired(CollateralAmount),
    /// Rewards deposited; new pool balance of the current epoch
    Deposited(CollateralAmount),
    /// Rewards withdrawn; amount paid
    Withdrawn(CollateralAmount),
    /// Stake balance of the recipient after the operation
    Stake(u128),
}

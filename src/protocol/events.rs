//! Protocol events for state change notifications.
//!
//! Events are emitted for all significant state changes in the protocol,
//! enabling clients to correlate a query with its settlement and to track
//! the rewards pool. They are only recorded when the emitting operation
//! commits.

use serde::{Deserialize, Serialize};

use crate::core::token::{ExchangeRate, TokenAmount};
use crate::core::vault::CollateralAmount;
use crate::protocol::query::QueryKind;
use crate::utils::crypto::{Address, QueryId};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProtocolEvent {
    // Query Events
    /// A price query was registered
    QueryCreated(QueryCreatedEvent),
    /// The oracle answered a query and it was consumed
    QuerySettled(QuerySettledEvent),
    /// An unanswered query was expired
    QueryExpired(QueryExpiredEvent),

    // Token Events
    /// Tokens issued for a settled buy
    TokensIssued(TokensIssuedEvent),
    /// Tokens redeemed for a settled sell
    TokensRedeemed(TokensRedeemedEvent),

    // Buffer Events
    /// Collateral added to the hub without issuing tokens
    Capitalized(CapitalizedEvent),

    // Rewards Events
    /// Fees credited to the current epoch pool
    RewardsDeposited(RewardsDepositedEvent),
    /// Stakeholder claimed sealed epochs
    RewardsWithdrawn(RewardsWithdrawnEvent),
    /// The recorded epoch moved forward
    EpochAdvanced(EpochAdvancedEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::QueryCreated(_) => "QueryCreated",
            Self::QuerySettled(_) => "QuerySettled",
            Self::QueryExpired(_) => "QueryExpired",
            Self::TokensIssued(_) => "TokensIssued",
            Self::TokensRedeemed(_) => "TokensRedeemed",
            Self::Capitalized(_) => "Capitalized",
            Self::RewardsDeposited(_) => "RewardsDeposited",
            Self::RewardsWithdrawn(_) => "RewardsWithdrawn",
            Self::EpochAdvanced(_) => "EpochAdvanced",
        }
    }

    /// Block at which the event was emitted
    pub fn block_height(&self) -> u64 {
        match self {
            Self::QueryCreated(e) => e.block_height,
            Self::QuerySettled(e) => e.block_height,
            Self::QueryExpired(e) => e.block_height,
            Self::TokensIssued(e) => e.block_height,
            Self::TokensRedeemed(e) => e.block_height,
            Self::Capitalized(e) => e.block_height,
            Self::RewardsDeposited(e) => e.block_height,
            Self::RewardsWithdrawn(e) => e.block_height,
            Self::EpochAdvanced(e) => e.block_height,
        }
    }

    /// Query the event belongs to, if any
    pub fn query_id(&self) -> Option<&QueryId> {
        match self {
            Self::QueryCreated(e) => Some(&e.query_id),
            Self::QuerySettled(e) => Some(&e.query_id),
            Self::QueryExpired(e) => Some(&e.query_id),
            Self::TokensIssued(e) => Some(&e.query_id),
            Self::TokensRedeemed(e) => Some(&e.query_id),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUERY EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Price query registered by a buy or sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCreatedEvent {
    pub query_id: QueryId,
    pub kind: QueryKind,
    pub requestor: Address,
    /// Net collateral (buy, wei) or token amount (sell, cents)
    pub value: u128,
    pub oracle_fee: CollateralAmount,
    pub block_height: u64,
}

/// Query consumed by an oracle answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySettledEvent {
    pub query_id: QueryId,
    pub kind: QueryKind,
    pub price: ExchangeRate,
    pub block_height: u64,
}

/// Query dropped after its time-to-live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExpiredEvent {
    pub query_id: QueryId,
    pub kind: QueryKind,
    pub requestor: Address,
    pub refunded: CollateralAmount,
    pub block_height: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tokens minted by a settled buy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensIssuedEvent {
    pub query_id: QueryId,
    pub holder: Address,
    pub tokens: TokenAmount,
    pub collateral: CollateralAmount,
    pub price: ExchangeRate,
    pub block_height: u64,
}

/// Tokens burned and paid out by a settled sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensRedeemedEvent {
    pub query_id: QueryId,
    pub holder: Address,
    pub tokens: TokenAmount,
    pub gross: CollateralAmount,
    pub payout: CollateralAmount,
    pub released: CollateralAmount,
    pub price: ExchangeRate,
    pub block_height: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUFFER EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral added to the buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalizedEvent {
    pub funder: Address,
    pub amount: CollateralAmount,
    pub contract_balance: CollateralAmount,
    pub block_height: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARDS EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fees credited to an epoch pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsDepositedEvent {
    pub funder: Address,
    pub epoch: u64,
    pub amount: CollateralAmount,
    pub pool_balance: CollateralAmount,
    pub block_height: u64,
}

/// Rewards claimed for a range of sealed epochs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsWithdrawnEvent {
    pub holder: Address,
    /// First claimed epoch (inclusive)
    pub from_epoch: u64,
    /// Last claimed epoch (inclusive)
    pub to_epoch: u64,
    pub amount: CollateralAmount,
    pub block_height: u64,
}

/// Recorded epoch moved forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAdvancedEvent {
    pub previous_epoch: u64,
    pub new_epoch: u64,
    pub block_height: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered record of emitted events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an event
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// All events in emission order
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Events of one type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Every event tied to `query_id`, in emission order
    pub fn for_query(&self, query_id: &QueryId) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.query_id() == Some(query_id))
            .collect()
    }

    /// Most recent event
    pub fn last(&self) -> Option<&ProtocolEvent> {
        self.events.last()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append every event of `other`
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }
}

impl IntoIterator for EventLog {
    type Item = ProtocolEvent;
    type IntoIter = std::vec::IntoIter<ProtocolEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

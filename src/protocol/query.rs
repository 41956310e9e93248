//! Pending price queries.
//!
//! A buy or sell commits its value immediately and records a query; the
//! price-dependent half runs when the oracle answers. Each query is consumed
//! exactly once, by settlement or by expiry.

use serde::{Deserialize, Serialize};

use crate::core::token::TokenAmount;
use crate::core::vault::CollateralAmount;
use crate::utils::crypto::{Address, QueryId};

/// Which half-finished operation a query belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    /// Collateral in, tokens out
    Buy,
    /// Tokens in, collateral out
    Sell,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A query awaiting its oracle answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuery {
    /// Query identifier
    pub id: QueryId,
    /// Buy or sell
    pub kind: QueryKind,
    /// Identity that will be settled
    pub requestor: Address,
    /// Net collateral in wei for a buy, token amount in cents for a sell
    pub value: u128,
    /// Oracle fee paid when the query was created
    pub oracle_fee: CollateralAmount,
    /// Block the query was created at
    pub created_at: u64,
}

impl PendingQuery {
    /// Collateral escrowed by a buy
    pub fn net_collateral(&self) -> Option<CollateralAmount> {
        match self.kind {
            QueryKind::Buy => Some(CollateralAmount::from_wei(self.value)),
            QueryKind::Sell => None,
        }
    }

    /// Tokens offered by a sell
    pub fn token_amount(&self) -> Option<TokenAmount> {
        match self.kind {
            QueryKind::Buy => None,
            QueryKind::Sell => Some(TokenAmount::from_cents(self.value)),
        }
    }

    /// First block at which the query may be expired under `ttl`
    pub fn expires_at(&self, ttl: u64) -> u64 {
        self.created_at.saturating_add(ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(kind: QueryKind) -> PendingQuery {
        let requestor = Address::derive("alice");
        PendingQuery {
            id: QueryId::generate(&Address::derive("hub"), 0, &requestor, 7),
            kind,
            requestor,
            value: 1_000,
            oracle_fee: CollateralAmount::from_wei(5),
            created_at: 7,
        }
    }

    #[test]
    fn test_value_by_kind() {
        let buy = query(QueryKind::Buy);
        assert_eq!(buy.net_collateral(), Some(CollateralAmount::from_wei(1_000)));
        assert_eq!(buy.token_amount(), None);

        let sell = query(QueryKind::Sell);
        assert_eq!(sell.token_amount(), Some(TokenAmount::from_cents(1_000)));
        assert_eq!(sell.net_collateral(), None);
    }

    #[test]
    fn test_expiry_saturates() {
        let q = query(QueryKind::Buy);
        assert_eq!(q.expires_at(10), 17);
        assert_eq!(q.expires_at(u64::MAX), u64::MAX);
    }
}

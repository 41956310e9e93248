//! Error types for the cryptofiat protocol.
//!
//! Every public operation is abort-and-revert: when one of these errors is
//! returned, none of the operation's state changes are visible.

use thiserror::Error;

/// Result type alias for cryptofiat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cryptofiat protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the capability required by the entry point
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Ledger Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Token, stake or collateral balance too small for the operation
    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Which ledger came up short
        asset: String,
        /// Amount the operation needs
        required: u128,
        /// Amount actually held
        available: u128,
    },

    /// Payment does not cover the oracle fee and protocol fees
    #[error("Payment {amount} below minimum {minimum}")]
    BelowMinimumPayment {
        /// Amount offered (or redeemed gross value)
        amount: u128,
        /// Amount that must be exceeded
        minimum: u128,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    // ═══════════════════════════════════════════════════════════════════
    // Settlement Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Settlement references a query that does not exist or was consumed
    #[error("Unknown query: {0}")]
    UnknownQuery(String),

    /// Oracle delivered a price that cannot be used for division
    #[error("Invalid exchange rate: {0}")]
    InvalidPrice(u64),

    /// Query expiry attempted before its deadline
    #[error("Query {query_id} cannot expire before block {expires_at}")]
    QueryNotExpired {
        /// Query identifier
        query_id: String,
        /// First block at which the query may be expired
        expires_at: u64,
    },

    /// Query expiry requested but no TTL is configured
    #[error("Pending query expiry is disabled")]
    QueryExpiryDisabled,

    // ═══════════════════════════════════════════════════════════════════
    // Rewards Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Rewards deposit with zero value
    #[error("Rewards deposit cannot be zero")]
    ZeroDeposit,

    /// Holder already claimed every sealed epoch
    #[error("Rewards already withdrawn up to epoch {last_epoch}")]
    AlreadyWithdrawn {
        /// Last epoch already claimed by the holder
        last_epoch: u64,
    },

    /// No sealed epoch yields a payout for the holder
    #[error("No rewards to claim")]
    NothingToClaim,

    // ═══════════════════════════════════════════════════════════════════
    // Lifecycle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// `initialize` called a second time
    #[error("Protocol already initialized")]
    AlreadyInitialized,

    /// Operation requires `initialize` to have run
    #[error("Protocol not initialized")]
    NotInitialized,

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Shorthand for an [`Error::InsufficientBalance`]
    pub fn insufficient(asset: &str, required: u128, available: u128) -> Self {
        Error::InsufficientBalance {
            asset: asset.to_string(),
            required,
            available,
        }
    }

    /// Returns true if the caller can retry after changing inputs or waiting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. }
                | Error::BelowMinimumPayment { .. }
                | Error::QueryNotExpired { .. }
                | Error::NothingToClaim
                | Error::AlreadyWithdrawn { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Internal(_)
                | Error::Storage(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Authorization errors: 1xxx
            Error::Unauthorized(_) => 1001,

            // Ledger errors: 2xxx
            Error::InsufficientBalance { .. } => 2001,
            Error::BelowMinimumPayment { .. } => 2002,
            Error::ZeroAmount => 2003,

            // Settlement errors: 3xxx
            Error::UnknownQuery(_) => 3001,
            Error::InvalidPrice(_) => 3002,
            Error::QueryNotExpired { .. } => 3003,
            Error::QueryExpiryDisabled => 3004,

            // Rewards errors: 4xxx
            Error::ZeroDeposit => 4001,
            Error::AlreadyWithdrawn { .. } => 4002,
            Error::NothingToClaim => 4003,

            // Lifecycle errors: 5xxx
            Error::AlreadyInitialized => 5001,
            Error::NotInitialized => 5002,

            // Validation errors: 6xxx
            Error::InvalidParameter { .. } => 6001,
            Error::Overflow { .. } => 6002,
            Error::Underflow { .. } => 6003,
            Error::InvariantViolation(_) => 6004,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
            Error::Storage(_) => 9002,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::Unauthorized("".into()).code(),
            Error::insufficient("token", 0, 0).code(),
            Error::BelowMinimumPayment { amount: 0, minimum: 0 }.code(),
            Error::UnknownQuery("".into()).code(),
            Error::ZeroDeposit.code(),
            Error::AlreadyWithdrawn { last_epoch: 0 }.code(),
            Error::NothingToClaim.code(),
            Error::AlreadyInitialized.code(),
            Error::NotInitialized.code(),
            Error::Internal("".into()).code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_display() {
        let err = Error::insufficient("token", 1000, 500);
        let msg = err.to_string();
        assert!(msg.contains("token"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::insufficient("collateral", 0, 0).is_recoverable());
        assert!(!Error::UnknownQuery("q".into()).is_recoverable());
    }

    #[test]
    fn test_is_critical() {
        assert!(Error::InvariantViolation("test".into()).is_critical());
        assert!(Error::Overflow { operation: "test".into() }.is_critical());
        assert!(!Error::Unauthorized("test".into()).is_critical());
    }
}

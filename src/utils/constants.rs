//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Wei per ether (1 ETH = 10^18 wei). Also the implied scale of the exchange rate.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTHETIC TOKEN CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Token decimals (stored as cents)
pub const TOKEN_DECIMALS: u8 = 2;

/// Base unit for the synthetic dollar (1 dollar = 100 cents)
pub const TOKEN_BASE_UNIT: u128 = 100;

/// Token symbol
pub const TOKEN_SYMBOL: &str = "CUSD";

// ═══════════════════════════════════════════════════════════════════════════════
// FEE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewards fee taken from every buy - 0.5% (50 basis points)
pub const REWARDS_FEE_BPS: u64 = 50;

/// Buffer fee retained by the hub on every buy - 0.5% (50 basis points)
pub const BUFFER_FEE_BPS: u64 = 50;

/// Oracle query fee charged per price query, in wei
pub const DEFAULT_ORACLE_FEE_WEI: u128 = 5_385_000_000_000_000;

/// Share of each sealed epoch pool paid to stakeholders - 50%
pub const CLAIM_SHARE_BPS: u64 = 5_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// EPOCH CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default epoch length in blocks (~1 day at 15s blocks)
pub const DEFAULT_BLOCKS_PER_EPOCH: u64 = 5_760;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Address length in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Hash / query id length in bytes
pub const HASH_LENGTH: usize = 32;

/// Derivation label of the hub's identity
pub const HUB_LABEL: &str = "cryptofiat.hub";

/// Derivation label of the synthetic token ledger's identity
pub const TOKEN_LABEL: &str = "cryptofiat.token";

/// Derivation label of the rewards pool's identity
pub const REWARDS_LABEL: &str = "cryptofiat.rewards";

/// Derivation label of the stake token's identity
pub const STAKE_LABEL: &str = "cryptofiat.stake";

/// Derivation label of the collateral vault's identity
pub const VAULT_LABEL: &str = "cryptofiat.vault";

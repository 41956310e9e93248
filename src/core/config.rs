//! Protocol configuration and parameters.
//!
//! Parameters are fixed when the protocol is deployed. The epoch length is
//! the one exception: it is written to the ledger by `initialize`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// STAKE BASIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Which stake balance weights a holder's share of a sealed epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeBasis {
    /// Holder and total stake as of the withdrawal block
    #[default]
    AtWithdrawal,
    /// Holder and total stake as of the first block of each claimed epoch
    EpochStart,
}

impl std::str::FromStr for StakeBasis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "at_withdrawal" | "at-withdrawal" => Ok(Self::AtWithdrawal),
            "epoch_start" | "epoch-start" => Ok(Self::EpochStart),
            other => Err(Error::InvalidParameter {
                name: "stake_basis".into(),
                reason: format!("unknown stake basis '{}'", other),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Deployment-time protocol parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Protocol version
    pub version: String,

    /// Share of every buy routed to the rewards pool, in basis points
    pub rewards_fee_bps: u64,

    /// Share of every buy kept in the collateral buffer, in basis points
    pub buffer_fee_bps: u64,

    /// Price query fee paid to the oracle per query, in wei
    pub oracle_fee: u128,

    /// Share of a sealed epoch pool distributed to stakeholders
    pub claim_share_bps: u64,

    /// Stake weighting used by rewards withdrawals
    pub stake_basis: StakeBasis,

    /// Blocks after which a pending query may be expired.
    /// `None` keeps queries pending until the oracle answers.
    pub query_ttl_blocks: Option<u64>,

    /// Epoch length used when `initialize` is not given one
    pub blocks_per_epoch: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            rewards_fee_bps: REWARDS_FEE_BPS,
            buffer_fee_bps: BUFFER_FEE_BPS,
            oracle_fee: DEFAULT_ORACLE_FEE_WEI,
            claim_share_bps: CLAIM_SHARE_BPS,
            stake_basis: StakeBasis::AtWithdrawal,
            query_ttl_blocks: None,
            blocks_per_epoch: DEFAULT_BLOCKS_PER_EPOCH,
        }
    }
}

impl ProtocolParams {
    /// Override the oracle query fee
    pub fn with_oracle_fee(mut self, fee: u128) -> Self {
        self.oracle_fee = fee;
        self
    }

    /// Override the buy fees
    pub fn with_fees(mut self, rewards_bps: u64, buffer_bps: u64) -> Self {
        self.rewards_fee_bps = rewards_bps;
        self.buffer_fee_bps = buffer_bps;
        self
    }

    /// Override the claimable share of each epoch pool
    pub fn with_claim_share(mut self, bps: u64) -> Self {
        self.claim_share_bps = bps;
        self
    }

    /// Override the stake basis
    pub fn with_stake_basis(mut self, basis: StakeBasis) -> Self {
        self.stake_basis = basis;
        self
    }

    /// Enable pending-query expiry after `blocks`
    pub fn with_query_ttl(mut self, blocks: u64) -> Self {
        self.query_ttl_blocks = Some(blocks);
        self
    }

    /// Override the default epoch length
    pub fn with_blocks_per_epoch(mut self, blocks: u64) -> Self {
        self.blocks_per_epoch = blocks;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        let fees = self.rewards_fee_bps.saturating_add(self.buffer_fee_bps);
        if fees >= BPS_DIVISOR {
            return Err(invalid("fees", "combined buy fees must stay below 100%"));
        }
        if self.claim_share_bps == 0 || self.claim_share_bps > BPS_DIVISOR {
            return Err(invalid("claim_share_bps", "must be in (0, 10000]"));
        }
        if self.query_ttl_blocks == Some(0) {
            return Err(invalid("query_ttl_blocks", "must be positive when set"));
        }
        if self.blocks_per_epoch == 0 {
            return Err(invalid("blocks_per_epoch", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}

//! Stake-weighted fee distribution.
//!
//! - `epoch`: block-derived epoch schedule
//! - `stake`: stake token with historical balances
//! - `pool`: per-epoch fee pools and lagged withdrawals

pub mod epoch;
pub mod pool;
pub mod stake;

pub use epoch::EpochSchedule;
pub use pool::{Claim, RewardsPool};
pub use stake::{Checkpoints, StakeToken};

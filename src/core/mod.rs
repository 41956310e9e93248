//! Core modules for the cryptofiat protocol.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Synthetic token ledger and exchange rates
//! - Native collateral balances

pub mod config;
pub mod token;
pub mod vault;

pub use config::*;
pub use token::*;
pub use vault::*;

//! Utility modules for the cryptofiat protocol.
//!
//! This module contains shared utilities used across the protocol:
//! - Identifiers (addresses, hashes, query ids)
//! - Checked integer arithmetic
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;

pub use constants::*;
pub use crypto::*;
pub use math::*;

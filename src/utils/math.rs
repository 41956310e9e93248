//! Checked integer arithmetic for ledger computations.
//!
//! Stateless helpers shared by every component. All divisions floor, so any
//! rounding residue stays with the protocol.

use crate::error::{Error, Result};
use crate::utils::constants::BPS_DIVISOR;

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: u128, b: u128) -> Result<u128> {
    if b == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    Ok(a / b)
}

/// Computes `floor(a * b / c)`
pub fn safe_mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    safe_div(safe_mul(a, b)?, c)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEE CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// `floor(amount * bps / 10000)`
pub fn bps_of(amount: u128, bps: u64) -> Result<u128> {
    safe_mul_div(amount, bps as u128, BPS_DIVISOR as u128)
}

/// Difference `a - b` as a signed value (used for the buffer, which may be negative)
pub fn signed_diff(a: u128, b: u128) -> Result<i128> {
    let a = i128::try_from(a).map_err(|_| Error::Overflow {
        operation: format!("{} as i128", a),
    })?;
    let b = i128::try_from(b).map_err(|_| Error::Overflow {
        operation: format!("{} as i128", b),
    })?;
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

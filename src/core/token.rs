//! Synthetic dollar token ledger.
//!
//! This module implements the token ledger backing the synthetic dollar:
//! - Per-holder balances and reserved collateral
//! - Total supply
//! - Mint and burn, restricted to the ledger's own authorization set
//!
//! The ledger never moves collateral itself. It only records how much of the
//! hub's balance backs each holder's tokens.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::vault::CollateralAmount;
use crate::error::{Error, Result};
use crate::storage::{address_suffix, make_key, prefixes, LedgerStore, StorageBackend};
use crate::utils::constants::*;
use crate::utils::crypto::Address;
use crate::utils::math::safe_mul_div;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed token amount in cents (prevents mixing wei and cents)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from cents
    pub const fn from_cents(cents: u128) -> Self {
        Self(cents)
    }

    /// Create from dollars (for convenience)
    pub fn from_dollars(dollars: u128) -> Self {
        Self(dollars.saturating_mul(TOKEN_BASE_UNIT))
    }

    /// Get raw cents value
    pub fn cents(&self) -> u128 {
        self.0
    }

    /// Get value in dollars (truncated)
    pub fn dollars(&self) -> u128 {
        self.0 / TOKEN_BASE_UNIT
    }

    /// Get formatted string representation
    pub fn to_string_formatted(&self) -> String {
        format!("${}.{:02}", self.0 / TOKEN_BASE_UNIT, self.0 % TOKEN_BASE_UNIT)
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_formatted())
    }
}

impl From<u128> for TokenAmount {
    fn from(cents: u128) -> Self {
        Self(cents)
    }
}

impl From<TokenAmount> for u128 {
    fn from(amount: TokenAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXCHANGE RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Oracle exchange rate in cents per ether
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ExchangeRate(u64);

impl ExchangeRate {
    /// Create from cents per ether
    pub const fn from_cents_per_ether(cents: u64) -> Self {
        Self(cents)
    }

    /// Raw cents per ether
    pub fn cents_per_ether(&self) -> u64 {
        self.0
    }

    /// Rate as a divisor, rejecting zero
    pub fn divisor(&self) -> Result<u128> {
        if self.0 == 0 {
            return Err(Error::InvalidPrice(self.0));
        }
        Ok(self.0 as u128)
    }

    /// Tokens bought by `collateral`: `floor(wei * rate / 10^18)`
    pub fn tokens_for(&self, collateral: CollateralAmount) -> Result<TokenAmount> {
        safe_mul_div(collateral.wei(), self.divisor()?, WEI_PER_ETHER).map(TokenAmount::from_cents)
    }

    /// Collateral owed for `tokens`: `floor(cents * 10^18 / rate)`
    pub fn collateral_for(&self, tokens: TokenAmount) -> Result<CollateralAmount> {
        safe_mul_div(tokens.cents(), WEI_PER_ETHER, self.divisor()?).map(CollateralAmount::from_wei)
    }
}

impl std::fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/ETH", TokenAmount::from_cents(self.0 as u128))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTHETIC TOKEN LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances, reserved collateral and supply of the synthetic dollar
#[derive(Debug, Clone)]
pub struct SyntheticToken {
    address: Address,
    admin: Address,
}

impl SyntheticToken {
    /// Create the ledger; `admin` is the only identity allowed to grant mint rights
    pub fn new(admin: Address) -> Self {
        Self {
            address: Address::derive(TOKEN_LABEL),
            admin,
        }
    }

    /// The ledger's store identity
    pub fn address(&self) -> &Address {
        &self.address
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AUTHORIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Allow `identity` to mint and burn. Admin only, idempotent.
    pub fn authorize<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        identity: &Address,
    ) -> Result<()> {
        if caller != &self.admin {
            return Err(Error::Unauthorized(format!(
                "{} cannot grant mint rights",
                caller.short()
            )));
        }
        if self.is_authorized(store, identity)? {
            return Ok(());
        }
        store.set(&self.address, &auth_key(identity), &true)?;
        debug!(identity = %identity.short(), "token minter authorized");
        Ok(())
    }

    /// Whether `identity` may mint and burn
    pub fn is_authorized<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        identity: &Address,
    ) -> Result<bool> {
        Ok(store.get::<bool>(&auth_key(identity))?.unwrap_or(false))
    }

    fn ensure_minter<B: StorageBackend>(&self, store: &LedgerStore<B>, caller: &Address) -> Result<()> {
        if self.is_authorized(store, caller)? {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} is not a token minter",
                caller.short()
            )))
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get total supply
    pub fn total_supply<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<TokenAmount> {
        store.get_or_default(prefixes::TOKEN_SUPPLY)
    }

    /// Get balance of a holder
    pub fn balance_of<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
    ) -> Result<TokenAmount> {
        store.get_or_default(&balance_key(holder))
    }

    /// Collateral reserved against a holder's tokens
    pub fn reserved_collateral<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
    ) -> Result<CollateralAmount> {
        store.get_or_default(&reserved_key(holder))
    }

    /// Every holder with a non-zero balance or reserve, in address order
    pub fn holders<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<Vec<Address>> {
        let mut holders = store
            .keys_with_prefix(prefixes::TOKEN_BALANCE)?
            .iter()
            .map(|key| address_suffix(key, prefixes::TOKEN_BALANCE))
            .collect::<Result<Vec<_>>>()?;
        for key in store.keys_with_prefix(prefixes::TOKEN_RESERVED)? {
            holders.push(address_suffix(&key, prefixes::TOKEN_RESERVED)?);
        }
        holders.sort();
        holders.dedup();
        Ok(holders)
    }

    /// Sum of reserved collateral across all holders
    pub fn total_reserved<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
    ) -> Result<CollateralAmount> {
        let mut total = CollateralAmount::ZERO;
        for holder in self.holders(store)? {
            total = total
                .checked_add(self.reserved_collateral(store, &holder)?)
                .ok_or_else(|| overflow("total reserved"))?;
        }
        Ok(total)
    }

    /// Verify supply equals the sum of all balances
    pub fn verify_supply_invariant<B: StorageBackend>(&self, store: &LedgerStore<B>) -> Result<bool> {
        let mut sum = TokenAmount::ZERO;
        for holder in self.holders(store)? {
            sum = sum
                .checked_add(self.balance_of(store, &holder)?)
                .ok_or_else(|| overflow("balance sum"))?;
        }
        Ok(sum == self.total_supply(store)?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MINT / BURN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Issue `tokens` to `holder`, reserving `collateral` against them
    pub fn mint<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        holder: &Address,
        tokens: TokenAmount,
        collateral: CollateralAmount,
    ) -> Result<()> {
        self.ensure_minter(store, caller)?;
        if tokens.is_zero() && collateral.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let balance = self
            .balance_of(store, holder)?
            .checked_add(tokens)
            .ok_or_else(|| overflow("mint balance"))?;
        let reserved = self
            .reserved_collateral(store, holder)?
            .checked_add(collateral)
            .ok_or_else(|| overflow("mint reserve"))?;
        let supply = self
            .total_supply(store)?
            .checked_add(tokens)
            .ok_or_else(|| overflow("mint supply"))?;

        self.write_position(store, holder, balance, reserved)?;
        store.set(&self.address, prefixes::TOKEN_SUPPLY, &supply)?;

        debug!(
            holder = %holder.short(),
            tokens = tokens.cents(),
            collateral = collateral.wei(),
            "tokens minted"
        );
        Ok(())
    }

    /// Destroy `tokens` held by `holder`, releasing a proportional share of
    /// the reserve: `floor(reserved * tokens / balance)`.
    ///
    /// The truncated remainder stays reserved against the remaining balance;
    /// burning the whole balance releases the whole reserve.
    pub fn burn<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        holder: &Address,
        tokens: TokenAmount,
    ) -> Result<CollateralAmount> {
        self.ensure_minter(store, caller)?;
        if tokens.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let balance = self.balance_of(store, holder)?;
        if balance < tokens {
            return Err(Error::insufficient("token", tokens.cents(), balance.cents()));
        }
        let reserved = self.reserved_collateral(store, holder)?;
        let released = CollateralAmount::from_wei(safe_mul_div(
            reserved.wei(),
            tokens.cents(),
            balance.cents(),
        )?);

        let supply = self.total_supply(store)?;
        let new_supply = supply.checked_sub(tokens).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "supply {} below burned amount {}",
                supply.cents(),
                tokens.cents()
            ))
        })?;

        self.write_position(
            store,
            holder,
            balance.saturating_sub(tokens),
            reserved.saturating_sub(released),
        )?;
        store.set(&self.address, prefixes::TOKEN_SUPPLY, &new_supply)?;

        debug!(
            holder = %holder.short(),
            tokens = tokens.cents(),
            released = released.wei(),
            "tokens burned"
        );
        Ok(released)
    }

    fn write_position<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        holder: &Address,
        balance: TokenAmount,
        reserved: CollateralAmount,
    ) -> Result<()> {
        if balance.is_zero() {
            store.delete(&self.address, &balance_key(holder))?;
        } else {
            store.set(&self.address, &balance_key(holder), &balance)?;
        }
        if reserved.is_zero() {
            store.delete(&self.address, &reserved_key(holder))?;
        } else {
            store.set(&self.address, &reserved_key(holder), &reserved)?;
        }
        Ok(())
    }
}

fn balance_key(holder: &Address) -> Vec<u8> {
    make_key(prefixes::TOKEN_BALANCE, holder.as_bytes())
}

fn reserved_key(holder: &Address) -> Vec<u8> {
    make_key(prefixes::TOKEN_RESERVED, holder.as_bytes())
}

fn auth_key(identity: &Address) -> Vec<u8> {
    make_key(prefixes::TOKEN_AUTH, identity.as_bytes())
}

fn overflow(operation: &str) -> Error {
    Error::Overflow {
        operation: operation.into(),
    }
}

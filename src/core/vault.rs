//! Native collateral balances.
//!
//! Every identity's ether balance lives here, including the hub's and the
//! rewards pool's contract balances. Collateral only moves when its owner
//! spends it; the deployer may credit genesis balances with `endow`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{address_suffix, make_key, prefixes, LedgerStore, StorageBackend};
use crate::utils::constants::*;
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed collateral amount in wei
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollateralAmount(u128);

impl CollateralAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from wei
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Create from whole ether
    pub fn from_ether(ether: u128) -> Self {
        Self(ether.saturating_mul(WEI_PER_ETHER))
    }

    /// Get raw wei value
    pub fn wei(&self) -> u128 {
        self.0
    }

    /// Whole ether (truncated)
    pub fn ether(&self) -> u128 {
        self.0 / WEI_PER_ETHER
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

impl std::fmt::Display for CollateralAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:018} ETH",
            self.0 / WEI_PER_ETHER,
            self.0 % WEI_PER_ETHER
        )
    }
}

impl From<u128> for CollateralAmount {
    fn from(wei: u128) -> Self {
        Self(wei)
    }
}

impl From<CollateralAmount> for u128 {
    fn from(amount: CollateralAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral ledger component
#[derive(Debug, Clone)]
pub struct Vault {
    address: Address,
    treasurer: Address,
}

impl Vault {
    /// Create the vault; `treasurer` is the only identity allowed to endow
    pub fn new(treasurer: Address) -> Self {
        Self {
            address: Address::derive(VAULT_LABEL),
            treasurer,
        }
    }

    /// The vault's store identity
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Collateral held by `who`
    pub fn balance_of<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        who: &Address,
    ) -> Result<CollateralAmount> {
        store.get_or_default(&balance_key(who))
    }

    /// Sum of every endowment ever made
    pub fn total_endowed<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
    ) -> Result<CollateralAmount> {
        store.get_or_default(prefixes::VAULT_ENDOWED)
    }

    /// Every identity with a recorded balance, in address order
    pub fn accounts<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
    ) -> Result<Vec<(Address, CollateralAmount)>> {
        store
            .keys_with_prefix(prefixes::VAULT_BALANCE)?
            .iter()
            .map(|key| {
                let who = address_suffix(key, prefixes::VAULT_BALANCE)?;
                Ok((who, self.balance_of(store, &who)?))
            })
            .collect()
    }

    /// Credit new collateral to `to`. Treasurer only.
    pub fn endow<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        to: &Address,
        amount: CollateralAmount,
    ) -> Result<()> {
        if caller != &self.treasurer {
            return Err(Error::Unauthorized(format!(
                "{} cannot endow collateral",
                caller.short()
            )));
        }
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let balance = self.balance_of(store, to)?;
        let endowed = self.total_endowed(store)?;
        let new_balance = balance.checked_add(amount).ok_or_else(|| overflow("endow"))?;
        let new_endowed = endowed.checked_add(amount).ok_or_else(|| overflow("endow"))?;

        store.set(&self.address, &balance_key(to), &new_balance)?;
        store.set(&self.address, prefixes::VAULT_ENDOWED, &new_endowed)?;
        debug!(to = %to.short(), amount = amount.wei(), "collateral endowed");
        Ok(())
    }

    /// Move `amount` of the caller's own collateral to `to`. Zero is a no-op.
    pub fn transfer<B: StorageBackend>(
        &self,
        store: &LedgerStore<B>,
        caller: &Address,
        to: &Address,
        amount: CollateralAmount,
    ) -> Result<()> {
        if amount.is_zero() || caller == to {
            return Ok(());
        }

        let from_balance = self.balance_of(store, caller)?;
        let remaining = from_balance.checked_sub(amount).ok_or_else(|| {
            Error::insufficient("collateral", amount.wei(), from_balance.wei())
        })?;
        let to_balance = self.balance_of(store, to)?;
        let credited = to_balance
            .checked_add(amount)
            .ok_or_else(|| overflow("collateral transfer"))?;

        store.set(&self.address, &balance_key(caller), &remaining)?;
        store.set(&self.address, &balance_key(to), &credited)?;
        debug!(
            from = %caller.short(),
            to = %to.short(),
            amount = amount.wei(),
            "collateral transferred"
        );
        Ok(())
    }
}

fn balance_key(who: &Address) -> Vec<u8> {
    make_key(prefixes::VAULT_BALANCE, who.as_bytes())
}

fn overflow(operation: &str) -> Error {
    Error::Overflow {
        operation: operation.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn setup() -> (LedgerStore<InMemoryStore>, Vault, Address) {
        let deployer = Address::derive("deployer");
        let store = LedgerStore::new(InMemoryStore::new(), deployer);
        let vault = Vault::new(deployer);
        store.authorize(&deployer, vault.address()).unwrap();
        (store, vault, deployer)
    }

    #[test]
    fn test_collateral_amount_display() {
        let amount = CollateralAmount::from_wei(1_500_000_000_000_000_000);
        assert_eq!(amount.to_string(), "1.500000000000000000 ETH");
        assert_eq!(CollateralAmount::from_ether(2).ether(), 2);
    }

    #[test]
    fn test_endow_treasurer_only() {
        let (store, vault, deployer) = setup();
        let alice = Address::derive("alice");

        let err = vault
            .endow(&store, &alice, &alice, CollateralAmount::from_ether(1))
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        vault
            .endow(&store, &deployer, &alice, CollateralAmount::from_ether(1))
            .unwrap();
        assert_eq!(
            vault.balance_of(&store, &alice).unwrap(),
            CollateralAmount::from_ether(1)
        );
        assert_eq!(
            vault.total_endowed(&store).unwrap(),
            CollateralAmount::from_ether(1)
        );
    }

    #[test]
    fn test_transfer_spends_own_balance() {
        let (store, vault, deployer) = setup();
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        vault
            .endow(&store, &deployer, &alice, CollateralAmount::from_wei(100))
            .unwrap();

        vault
            .transfer(&store, &alice, &bob, CollateralAmount::from_wei(40))
            .unwrap();
        assert_eq!(vault.balance_of(&store, &alice).unwrap().wei(), 60);
        assert_eq!(vault.balance_of(&store, &bob).unwrap().wei(), 40);

        let err = vault
            .transfer(&store, &bob, &alice, CollateralAmount::from_wei(41))
            .unwrap_err();
        assert_eq!(err, Error::insufficient("collateral", 41, 40));
    }

    #[test]
    fn test_conservation_across_transfers() {
        let (store, vault, deployer) = setup();
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        vault
            .endow(&store, &deployer, &alice, CollateralAmount::from_wei(1_000))
            .unwrap();
        vault
            .endow(&store, &deployer, &bob, CollateralAmount::from_wei(500))
            .unwrap();
        vault
            .transfer(&store, &alice, &bob, CollateralAmount::from_wei(333))
            .unwrap();

        let total: u128 = vault
            .accounts(&store)
            .unwrap()
            .iter()
            .map(|(_, amount)| amount.wei())
            .sum();
        assert_eq!(total, vault.total_endowed(&store).unwrap().wei());
    }
}

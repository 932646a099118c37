//! Per-address, per-asset balance ledger
//!
//! Read access and read-for-update access are kept distinct so a snapshot
//! can report exactly which records a settlement touched (the set that has
//! to be persisted afterwards).

use crate::types::{Address, AssetId, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Asset balances held by one address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    balances: BTreeMap<AssetId, Quantity>,
}

impl Account {
    /// Create empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance for one asset (zero when the asset is unknown)
    pub fn asset_balance(&self, asset: &AssetId) -> Quantity {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Set balance for one asset. Zero balances are kept: a zero entry
    /// records that the address has transacted in the asset.
    pub fn set_asset_balance(&mut self, asset: AssetId, amount: Quantity) {
        self.balances.insert(asset, amount);
    }

    /// Iterate balances in canonical asset order
    pub fn balances(&self) -> impl Iterator<Item = (&AssetId, &Quantity)> {
        self.balances.iter()
    }
}

/// Balance ledger: one account per address, canonical address order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    accounts: BTreeMap<Address, Account>,

    /// Addresses read for update since the last `clear_dirty`
    #[serde(skip)]
    dirty: BTreeSet<Address>,
}

impl BalanceLedger {
    /// Create empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only account lookup
    pub fn read(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Mutable account lookup, marking the record dirty for persistence
    pub fn read_for_update(&mut self, address: &Address) -> Option<&mut Account> {
        let account = self.accounts.get_mut(address);
        if account.is_some() {
            self.dirty.insert(address.clone());
        }
        account
    }

    /// Mutable account lookup, creating an empty account if absent
    pub fn create_if_absent(&mut self, address: &Address) -> &mut Account {
        self.dirty.insert(address.clone());
        self.accounts.entry(address.clone()).or_default()
    }

    /// Convenience: balance of (address, asset), zero when unknown
    pub fn asset_balance(&self, address: &Address, asset: &AssetId) -> Quantity {
        self.read(address)
            .map(|a| a.asset_balance(asset))
            .unwrap_or(Decimal::ZERO)
    }

    /// Addresses whose accounts were read for update
    pub fn dirty_addresses(&self) -> impl Iterator<Item = &Address> {
        self.dirty.iter()
    }

    /// Reset dirty tracking (after the caller has persisted the records)
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

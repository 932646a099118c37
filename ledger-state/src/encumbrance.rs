//! Encumbrance ledger: named holds against asset balances
//!
//! An encumbrance restricts transfer of part of an address's holding to a
//! set of authorized beneficiaries, with optional expiry. Entries for one
//! (address, asset) live in an ordered list: earlier entries are funded by
//! the holding first, which is what gives high-priority holds their meaning.
//!
//! # Invariants
//!
//! - Entry amounts are never negative
//! - An `AssetEncumbrance` with no entries is removed
//! - An `AddressEncumbrance` with no asset encumbrances is removed

use crate::types::{Address, AssetId, Quantity, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A party interested in an encumbrance (beneficiary or administrator),
/// valid over a half-open time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interested {
    /// Interested address
    pub address: Address,

    /// Start of validity (inclusive)
    pub start_time: Timestamp,

    /// End of validity (exclusive); zero means open-ended
    pub end_time: Timestamp,
}

impl Interested {
    /// Open-ended interest for an address
    pub fn forever(address: Address) -> Self {
        Self {
            address,
            start_time: 0,
            end_time: 0,
        }
    }

    /// Is this interest valid at `now`?
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.start_time <= now && (self.end_time == 0 || now < self.end_time)
    }
}

/// Position of an entry within the funding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Funded before all normal entries of the same asset
    High,
    /// Funded in list order after high-priority entries
    Normal,
}

/// A single named hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncumbranceEntry {
    /// Reference name (a contract address for contract-specific holds)
    pub reference: String,

    /// Held amount, never negative
    pub amount: Quantity,

    /// Addresses allowed to exercise the hold
    pub beneficiaries: Vec<Interested>,

    /// Addresses allowed to amend or withdraw the hold
    pub administrators: Vec<Interested>,

    /// Expiry time; `None` means the hold does not expire
    pub expiry: Option<Timestamp>,

    /// Funding priority
    pub priority: Priority,
}

impl EncumbranceEntry {
    /// Has this entry expired at `now`?
    pub fn has_expired(&self, now: Timestamp) -> bool {
        matches!(self.expiry, Some(t) if now >= t)
    }

    /// Is `address` a valid beneficiary at `now`?
    ///
    /// An entry with no beneficiaries is a pure lock: it reduces the
    /// unencumbered holding but authorizes nobody.
    pub fn is_beneficiary_valid(&self, address: &Address, now: Timestamp) -> bool {
        self.beneficiaries
            .iter()
            .any(|b| b.address == *address && b.is_valid_at(now))
    }

    fn same_interested_parties(&self, other: &EncumbranceEntry) -> bool {
        self.beneficiaries == other.beneficiaries && self.administrators == other.administrators
    }
}

/// Ordered holds for one (address, asset)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEncumbrance {
    entries: Vec<EncumbranceEntry>,
}

impl AssetEncumbrance {
    /// Create empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// No entries left?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in funding order
    pub fn entries(&self) -> &[EncumbranceEntry] {
        &self.entries
    }

    /// Total amount encumbered by non-expired entries at `now`
    pub fn total_encumbered(&self, now: Timestamp) -> Quantity {
        self.entries
            .iter()
            .filter(|e| !e.has_expired(now))
            .map(|e| e.amount)
            .sum()
    }

    /// Aggregate all entries under `reference` that `initiator` may
    /// exercise at `now`, ignoring what the holding actually covers.
    ///
    /// Used on the issuance path, where payment is not capped by balance.
    pub fn aggregate_by_reference(
        &self,
        reference: &str,
        initiator: &Address,
        now: Timestamp,
    ) -> Option<EncumbranceEntry> {
        let mut aggregate: Option<EncumbranceEntry> = None;
        for entry in &self.entries {
            if entry.reference != reference
                || entry.has_expired(now)
                || !entry.is_beneficiary_valid(initiator, now)
            {
                continue;
            }
            match aggregate.as_mut() {
                Some(agg) => agg.amount += entry.amount,
                None => aggregate = Some(entry.clone()),
            }
        }
        aggregate
    }

    /// Aggregate entries under `reference` exercisable by `initiator`,
    /// capped at what `held` actually covers.
    ///
    /// Entries consume the holding in funding order: an entry earlier in
    /// the list absorbs balance before a later one, whether or not it
    /// matches `reference`.
    pub fn aggregate_available_by_reference(
        &self,
        reference: &str,
        initiator: &Address,
        now: Timestamp,
        held: Quantity,
    ) -> Option<EncumbranceEntry> {
        let mut remaining = held.max(Decimal::ZERO);
        let mut aggregate: Option<EncumbranceEntry> = None;
        for entry in &self.entries {
            if entry.has_expired(now) {
                continue;
            }
            let covered = entry.amount.min(remaining);
            remaining -= covered;
            if entry.reference != reference || !entry.is_beneficiary_valid(initiator, now) {
                continue;
            }
            match aggregate.as_mut() {
                Some(agg) => agg.amount += covered,
                None => {
                    let mut copy = entry.clone();
                    copy.amount = covered;
                    aggregate = Some(copy);
                }
            }
        }
        aggregate
    }

    /// Consume up to `amount` from entries under `reference`, in funding
    /// order, skipping expired entries. Entries drained to zero are
    /// removed. Returns the amount actually consumed.
    pub fn consume(&mut self, reference: &str, amount: Quantity, now: Timestamp) -> Quantity {
        let mut left = amount;
        for entry in &mut self.entries {
            if left <= Decimal::ZERO {
                break;
            }
            if entry.reference != reference || entry.has_expired(now) {
                continue;
            }
            let take = entry.amount.min(left);
            entry.amount -= take;
            left -= take;
        }
        self.entries.retain(|e| e.amount > Decimal::ZERO);
        amount - left
    }

    /// Remove every entry under `reference`
    pub fn remove_encumbrance(&mut self, reference: &str) {
        self.entries.retain(|e| e.reference != reference);
    }

    /// Install an entry.
    ///
    /// With `cumulative`, the amount accumulates onto an existing live
    /// entry with the same reference and priority, but only when the
    /// interested-party lists match exactly; merging holds with different
    /// beneficiaries or administrators would silently change who may
    /// exercise them, so that case returns `false` and the caller must
    /// treat the state as unrecoverable.
    ///
    /// `high_priority` entries are inserted at the front of the funding
    /// order so same-settlement receipts satisfy them first.
    pub fn set_encumbrance_entry(
        &mut self,
        now: Timestamp,
        mut entry: EncumbranceEntry,
        cumulative: bool,
        high_priority: bool,
    ) -> bool {
        entry.priority = if high_priority {
            Priority::High
        } else {
            Priority::Normal
        };

        if cumulative {
            if let Some(existing) = self.entries.iter_mut().find(|e| {
                e.reference == entry.reference
                    && e.priority == entry.priority
                    && !e.has_expired(now)
            }) {
                if !existing.same_interested_parties(&entry) {
                    return false;
                }
                existing.amount += entry.amount;
                return true;
            }
        }

        if high_priority {
            self.entries.insert(0, entry);
        } else {
            self.entries.push(entry);
        }
        true
    }
}

/// All asset encumbrances for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEncumbrance {
    /// Owning address
    pub address: Address,

    assets: BTreeMap<AssetId, AssetEncumbrance>,
}

impl AddressEncumbrance {
    /// Create empty record for an address
    pub fn new(address: Address) -> Self {
        Self {
            address,
            assets: BTreeMap::new(),
        }
    }

    /// No asset encumbrances left?
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Read-only asset encumbrance lookup
    pub fn asset_encumbrance(&self, asset: &AssetId) -> Option<&AssetEncumbrance> {
        self.assets.get(asset)
    }

    /// Mutable asset encumbrance lookup
    pub fn asset_encumbrance_mut(&mut self, asset: &AssetId) -> Option<&mut AssetEncumbrance> {
        self.assets.get_mut(asset)
    }

    /// Mutable asset encumbrance, created empty if absent
    pub fn asset_encumbrance_or_default(&mut self, asset: &AssetId) -> &mut AssetEncumbrance {
        self.assets.entry(asset.clone()).or_default()
    }

    /// Remove one asset encumbrance outright
    pub fn remove_asset_encumbrance(&mut self, asset: &AssetId) {
        self.assets.remove(asset);
    }

    /// Drop asset encumbrances whose entry lists have drained
    pub fn prune_empty(&mut self) {
        self.assets.retain(|_, enc| !enc.is_empty());
    }

    /// Iterate asset encumbrances in canonical asset order
    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, &AssetEncumbrance)> {
        self.assets.iter()
    }
}

/// Encumbrance ledger: one record per address, canonical order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncumbranceLedger {
    records: BTreeMap<Address, AddressEncumbrance>,

    /// Records read for update since the last `clear_dirty`
    #[serde(skip)]
    dirty: BTreeSet<Address>,
}

impl EncumbranceLedger {
    /// Create empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only record lookup
    pub fn find(&self, address: &Address) -> Option<&AddressEncumbrance> {
        self.records.get(address)
    }

    /// Mutable record lookup, marking it dirty for persistence
    pub fn find_for_update(&mut self, address: &Address) -> Option<&mut AddressEncumbrance> {
        let record = self.records.get_mut(address);
        if record.is_some() {
            self.dirty.insert(address.clone());
        }
        record
    }

    /// Mutable record, created empty if absent
    pub fn find_or_create(&mut self, address: &Address) -> &mut AddressEncumbrance {
        self.dirty.insert(address.clone());
        self.records
            .entry(address.clone())
            .or_insert_with(|| AddressEncumbrance::new(address.clone()))
    }

    /// Insert a record wholesale
    pub fn add(&mut self, record: AddressEncumbrance) {
        self.dirty.insert(record.address.clone());
        self.records.insert(record.address.clone(), record);
    }

    /// Delete a record outright
    pub fn delete(&mut self, address: &Address) {
        if self.records.remove(address).is_some() {
            self.dirty.insert(address.clone());
        }
    }

    /// Total encumbered for (address, asset) at `now`
    pub fn total_encumbered(
        &self,
        address: &Address,
        asset: &AssetId,
        now: Timestamp,
    ) -> Quantity {
        self.find(address)
            .and_then(|r| r.asset_encumbrance(asset))
            .map(|e| e.total_encumbered(now))
            .unwrap_or(Decimal::ZERO)
    }

    /// Drop empty asset encumbrances for `address`, and the whole record
    /// once nothing is left
    pub fn prune(&mut self, address: &Address) {
        let remove = match self.records.get_mut(address) {
            Some(record) => {
                record.prune_empty();
                record.is_empty()
            }
            None => return,
        };
        if remove {
            debug!(address = %address, "removing drained encumbrance record");
            self.records.remove(address);
        }
        self.dirty.insert(address.clone());
    }

    /// Records read for update
    pub fn dirty_addresses(&self) -> impl Iterator<Item = &Address> {
        self.dirty.iter()
    }

    /// Reset dirty tracking
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

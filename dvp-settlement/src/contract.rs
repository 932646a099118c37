//! DVP contract record and the ledger snapshot it lives in
//!
//! The contract record is the durable state of one delivery-versus-payment
//! commitment: who pays what to whom, which authorisations and parameters
//! gate it, and where it stands in its lifecycle. Transaction-type
//! dispatch is a closed tag enum; there is no type hierarchy.

use ledger_state::{
    Address, AssetId, BalanceLedger, EncumbranceLedger, Interested, LockRegistry, Quantity,
    Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Contract function tag (closed set; only DVP is evaluated here)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractFunction {
    /// Multi-party delivery-versus-payment settlement
    DvpUk,
}

impl ContractFunction {
    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractFunction::DvpUk => "dvp_uk",
        }
    }
}

/// A payment or receipt amount: literal quantity or formula over parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountSpec {
    /// Fixed quantity
    Literal(Quantity),
    /// Formula evaluated against bound contract parameters
    Formula(String),
}

impl AmountSpec {
    /// Literal value, if this is not a formula
    pub fn literal(&self) -> Option<Quantity> {
        match self {
            AmountSpec::Literal(q) => Some(*q),
            AmountSpec::Formula(_) => None,
        }
    }
}

impl From<i64> for AmountSpec {
    fn from(value: i64) -> Self {
        AmountSpec::Literal(Decimal::from(value))
    }
}

/// One party's pay leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayItem {
    /// Paying address
    pub address: Address,

    /// Asset being paid
    pub asset: AssetId,

    /// Amount (literal or formula)
    pub amount: AmountSpec,

    /// Issuance leg: the payer mints rather than transfers held balance
    pub issuance: bool,

    /// Per-item encumbrance name, overriding the contract default
    pub encumbrance_name: Option<String>,

    /// Item-level signature presence
    pub signed: bool,
}

/// One party's receive leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveItem {
    /// Receiving address
    pub address: Address,

    /// Asset being received
    pub asset: AssetId,

    /// Amount (literal or formula)
    pub amount: AmountSpec,
}

/// A contract party with its pay and receive schedules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Party identifier within the contract
    pub identifier: String,

    /// Signing address
    pub sig_address: Address,

    /// Signing public key (opaque; verification is external)
    pub public_key: String,

    /// Party-level signature presence
    pub signed: bool,

    /// Party must sign regardless of encumbrance cover
    pub must_sign: bool,

    /// Pay legs
    pub pay: Vec<PayItem>,

    /// Receive legs
    pub receive: Vec<ReceiveItem>,
}

impl Party {
    /// Is this pay leg authorized by a signature (party- or item-level)?
    pub fn payment_signed(&self, item: &PayItem) -> bool {
        self.signed || item.signed
    }
}

/// Third-party authorisation gating the commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorisation {
    /// Authorisation id
    pub id: String,

    /// Signature presence
    pub signed: bool,

    /// Authoriser has actively refused
    pub refused: bool,
}

/// Request to install a new encumbrance as part of settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEncumbrance {
    /// Reference name for the new hold
    pub reference: String,

    /// Address whose holding is encumbered
    pub address: Address,

    /// Asset to encumber
    pub asset: AssetId,

    /// Amount (literal or formula)
    pub amount: AmountSpec,

    /// Beneficiaries of the new hold
    pub beneficiaries: Vec<Interested>,

    /// Administrators of the new hold
    pub administrators: Vec<Interested>,

    /// Signature presence. Unsigned requests are only valid as a pure
    /// lock: no beneficiaries, fully covered by this settlement's receipts
    pub signed: bool,
}

/// Contract parameter: a constant or a formula over earlier parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Value (literal or formula)
    pub value: AmountSpec,

    /// Evaluation order index (ascending)
    pub calculated_index: i64,

    /// Calculation-only parameters need no signature
    pub calculation_only: bool,

    /// Signature presence
    pub signed: bool,
}

/// Contract-level encumbrance configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEncumbrance {
    /// Use the contract's own address as the default encumbrance name.
    /// Such holds are withdrawn when the contract expires or completes.
    pub use_contract_address: bool,

    /// Explicit default encumbrance name
    pub default_name: Option<String>,
}

/// The DVP contract record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvpContract {
    /// Contract address (identity)
    pub address: Address,

    /// Function tag
    pub function: ContractFunction,

    /// Issuing address (initiator; the beneficiary checked on holds)
    pub issuing_address: Address,

    /// Commits are rejected before this time
    pub start_date: Timestamp,

    /// Contract expires at this time
    pub expiry: Timestamp,

    /// Next scheduled evaluation time
    pub next_wake: Timestamp,

    /// Terminal for commit logic once set
    pub completed: bool,

    /// Diagnostic status message (no control flow reads this)
    pub status_message: String,

    /// Contract-level encumbrance configuration
    pub encumbrance: Option<ContractEncumbrance>,

    /// Parties in record order
    pub parties: Vec<Party>,

    /// Authorisations gating commit
    pub authorisations: Vec<Authorisation>,

    /// Encumbrances to install on settlement
    pub add_encumbrances: Vec<AddEncumbrance>,

    /// Parameters, canonically ordered by key
    pub parameters: BTreeMap<String, Parameter>,
}

impl DvpContract {
    /// New pending contract with no parties
    pub fn new(
        address: Address,
        issuing_address: Address,
        start_date: Timestamp,
        expiry: Timestamp,
    ) -> Self {
        Self {
            address,
            function: ContractFunction::DvpUk,
            issuing_address,
            start_date,
            expiry,
            next_wake: start_date,
            completed: false,
            status_message: String::new(),
            encumbrance: None,
            parties: Vec::new(),
            authorisations: Vec::new(),
            add_encumbrances: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Does this contract authorize payments via encumbrances at all?
    pub fn uses_encumbrances(&self) -> bool {
        self.encumbrance
            .as_ref()
            .map(|e| e.use_contract_address || e.default_name.is_some())
            .unwrap_or(false)
    }

    /// Is the contract's own address in force as an encumbrance name?
    pub fn has_contract_specific_encumbrance(&self) -> bool {
        self.encumbrance
            .as_ref()
            .map(|e| e.use_contract_address)
            .unwrap_or(false)
    }

    /// Contract-default encumbrance name, if any
    pub fn default_encumbrance_name(&self) -> Option<String> {
        let enc = self.encumbrance.as_ref()?;
        if enc.use_contract_address {
            Some(self.address.as_str().to_string())
        } else {
            enc.default_name.clone()
        }
    }

    /// Encumbrance name applying to one pay item: per-item override first,
    /// contract default otherwise
    pub fn encumbrance_name_for(&self, item: &PayItem) -> Option<String> {
        item.encumbrance_name
            .clone()
            .or_else(|| self.default_encumbrance_name())
    }

    /// Parameters in deterministic evaluation order:
    /// (calculated_index ascending, key ascending)
    pub fn ordered_parameters(&self) -> Vec<(&String, &Parameter)> {
        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort_by(|(ka, pa), (kb, pb)| {
            pa.calculated_index
                .cmp(&pb.calculated_index)
                .then_with(|| ka.cmp(kb))
        });
        params
    }

    /// Addresses related to this contract, for lifecycle notifications:
    /// every party signing address, in canonical order
    pub fn related_addresses(&self) -> Vec<Address> {
        let set: BTreeSet<Address> = self
            .parties
            .iter()
            .map(|p| p.sig_address.clone())
            .filter(|a| !a.is_empty())
            .collect();
        set.into_iter().collect()
    }
}

/// Contract records keyed by address, canonical order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractStore {
    contracts: BTreeMap<Address, DvpContract>,

    /// Records read for update since the last `clear_dirty`
    #[serde(skip)]
    dirty: BTreeSet<Address>,
}

impl ContractStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only contract lookup
    pub fn find(&self, address: &Address) -> Option<&DvpContract> {
        self.contracts.get(address)
    }

    /// Mutable contract lookup, marking the record dirty
    pub fn find_for_update(&mut self, address: &Address) -> Option<&mut DvpContract> {
        let contract = self.contracts.get_mut(address);
        if contract.is_some() {
            self.dirty.insert(address.clone());
        }
        contract
    }

    /// Insert a contract record
    pub fn add(&mut self, contract: DvpContract) {
        self.dirty.insert(contract.address.clone());
        self.contracts.insert(contract.address.clone(), contract);
    }

    /// Delete a contract record
    pub fn delete(&mut self, address: &Address) {
        if self.contracts.remove(address).is_some() {
            self.dirty.insert(address.clone());
        }
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

/// The exclusively-owned mutable ledger snapshot one evaluation runs over
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Balance ledger
    pub balances: BalanceLedger,

    /// Encumbrance ledger
    pub encumbrances: EncumbranceLedger,

    /// Asset lock registry
    pub locks: LockRegistry,

    /// Contract records
    pub contracts: ContractStore,

    /// Set when an encumbrance accumulation invariant was violated.
    /// Downstream processing must halt rather than continue from here.
    pub corrupted: bool,
}

impl StateSnapshot {
    /// Create empty snapshot
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_ordering_index_then_key() {
        let mut contract = DvpContract::new(
            Address::new("Contract1"),
            Address::new("Issuer"),
            0,
            1000,
        );
        for (key, index) in [("zeta", 0), ("alpha", 1), ("mid", 0), ("beta", 1)] {
            contract.parameters.insert(
                key.to_string(),
                Parameter {
                    value: AmountSpec::from(1),
                    calculated_index: index,
                    calculation_only: true,
                    signed: false,
                },
            );
        }

        let order: Vec<&str> = contract
            .ordered_parameters()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(order, vec!["mid", "zeta", "alpha", "beta"]);
    }

    #[test]
    fn test_default_encumbrance_name_prefers_contract_address() {
        let mut contract = DvpContract::new(
            Address::new("Contract1"),
            Address::new("Issuer"),
            0,
            1000,
        );
        assert!(!contract.uses_encumbrances());
        assert_eq!(contract.default_encumbrance_name(), None);

        contract.encumbrance = Some(ContractEncumbrance {
            use_contract_address: false,
            default_name: Some("escrow9".to_string()),
        });
        assert!(contract.uses_encumbrances());
        assert!(!contract.has_contract_specific_encumbrance());
        assert_eq!(
            contract.default_encumbrance_name(),
            Some("escrow9".to_string())
        );

        contract.encumbrance = Some(ContractEncumbrance {
            use_contract_address: true,
            default_name: None,
        });
        assert!(contract.has_contract_specific_encumbrance());
        assert_eq!(
            contract.default_encumbrance_name(),
            Some("Contract1".to_string())
        );
    }

    #[test]
    fn test_encumbrance_name_item_override_wins() {
        let mut contract = DvpContract::new(
            Address::new("Contract1"),
            Address::new("Issuer"),
            0,
            1000,
        );
        contract.encumbrance = Some(ContractEncumbrance {
            use_contract_address: true,
            default_name: None,
        });

        let item = PayItem {
            address: Address::new("Party1"),
            asset: AssetId::new("IssuerGB", "GBP"),
            amount: AmountSpec::from(10),
            issuance: false,
            encumbrance_name: Some("special".to_string()),
            signed: false,
        };
        assert_eq!(
            contract.encumbrance_name_for(&item),
            Some("special".to_string())
        );
    }

    #[test]
    fn test_store_dirty_tracking() {
        let mut store = ContractStore::new();
        let addr = Address::new("Contract1");
        store.add(DvpContract::new(
            addr.clone(),
            Address::new("Issuer"),
            0,
            1000,
        ));
        store.clear_dirty();

        assert!(store.find(&addr).is_some());
        assert_eq!(store.dirty_addresses().count(), 0);

        store.find_for_update(&addr).unwrap().completed = true;
        assert_eq!(store.dirty_addresses().count(), 1);
    }
}

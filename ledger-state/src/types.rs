//! Core identifier types for the ledger snapshot
//!
//! All types are designed for:
//! - Deterministic ordering (`Ord` everywhere, `BTreeMap` keys)
//! - Exact arithmetic (`Decimal` for quantities)
//! - Deterministic serialization (serde derives, canonical field order)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger time in seconds, as supplied by consensus ordering.
///
/// Never derived from the wall clock: every replica must see the same
/// reference time for the same event.
pub type Timestamp = i64;

/// Ledger quantity. Integral once it reaches a balance or a hold.
pub type Quantity = Decimal;

/// Ledger address (account, contract, or issuer identity)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty address (no counterparty given)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset identifier: issuing namespace plus instrument class
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId {
    /// Issuing namespace (typically the issuer address)
    pub namespace: String,

    /// Instrument class within the namespace
    pub class: String,
}

impl AssetId {
    /// Create new asset id
    pub fn new(namespace: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            class: class.into(),
        }
    }

    /// Full asset id, `namespace|class`
    pub fn full_id(&self) -> String {
        format!("{}|{}", self.namespace, self.class)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.namespace, self.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let addr = Address::new("AcmeSettlementCo");
        assert_eq!(addr.as_str(), "AcmeSettlementCo");
        assert_eq!(addr.to_string(), "AcmeSettlementCo");
        assert!(!addr.is_empty());
        assert!(Address::new("").is_empty());
    }

    #[test]
    fn test_asset_full_id() {
        let asset = AssetId::new("IssuerGB", "GBP");
        assert_eq!(asset.full_id(), "IssuerGB|GBP");
        assert_eq!(asset.to_string(), "IssuerGB|GBP");
    }

    #[test]
    fn test_asset_ordering_is_namespace_then_class() {
        let a = AssetId::new("A", "ZZZ");
        let b = AssetId::new("B", "AAA");
        assert!(a < b);
    }
}

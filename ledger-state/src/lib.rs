//! Meridian Ledger State
//!
//! In-memory snapshot primitives for the replicated settlement ledger:
//! balances, encumbrances (named holds), asset locks, and canonical hashing.
//!
//! # Architecture
//!
//! - **Exclusive ownership**: a snapshot is owned and mutated by exactly one
//!   caller for the duration of an evaluation; there is no interior locking
//! - **Canonical iteration**: every collection that can affect replicated
//!   state is keyed through `BTreeMap`/`BTreeSet`, never hash order
//! - **Exact arithmetic**: all quantities are `rust_decimal::Decimal`,
//!   integral once they reach the ledger
//!
//! # Invariants
//!
//! - Encumbrance amounts are never negative
//! - An asset encumbrance with no entries does not exist; an address
//!   encumbrance with no asset encumbrances does not exist
//! - Deterministic replay: same snapshot + same mutations → same state

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod balances;
pub mod crypto;
pub mod encumbrance;
pub mod locks;
pub mod types;

// Re-exports
pub use balances::{Account, BalanceLedger};
pub use crypto::{hash_bytes, Hasher, Sha256Hasher};
pub use encumbrance::{
    AddressEncumbrance, AssetEncumbrance, EncumbranceEntry, EncumbranceLedger, Interested,
    Priority,
};
pub use locks::LockRegistry;
pub use types::{Address, AssetId, Quantity, Timestamp};

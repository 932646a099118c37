//! Asset lock registry
//!
//! A lock suspends transfers for either a whole issuing namespace or a
//! single full asset id. The engine checks both forms for every leg.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Registry of locked namespaces and asset ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockRegistry {
    locked: BTreeSet<String>,
}

impl LockRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a namespace or full asset id
    pub fn lock(&mut self, target: impl Into<String>) {
        self.locked.insert(target.into());
    }

    /// Remove a lock
    pub fn unlock(&mut self, target: &str) {
        self.locked.remove(target);
    }

    /// Is this namespace or asset id locked?
    pub fn is_locked(&self, target: &str) -> bool {
        self.locked.contains(target)
    }
}

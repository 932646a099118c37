//! Lifecycle scheduler interface
//!
//! The engine never sleeps or polls: it asks an external collaborator to
//! wake the contract address at a ledger time, and reports lifecycle
//! transitions for downstream consumers. Timeouts are ledger-level wake
//! times, not real-time deadlines.

use ledger_state::{Address, Timestamp};
use std::collections::BTreeSet;
use tracing::debug;

/// Contract lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Contract record created
    Create,
    /// Contract expired before settling
    Expire,
    /// Contract settled
    Complete,
    /// Contract record deleted
    Delete,
}

/// External collaborator that owns wake scheduling and notifications
pub trait LifecycleScheduler {
    /// Wake the contract address at ledger time `at`
    fn schedule_wake(&mut self, contract: &Address, at: Timestamp);

    /// Drop a previously scheduled wake
    fn cancel_wake(&mut self, contract: &Address, at: Timestamp);

    /// Report a lifecycle transition with the addresses it concerns
    fn notify(&mut self, event: LifecycleEvent, contract: &Address, related: &[Address]);
}

/// In-memory scheduler that records everything it is told.
///
/// Used by tests and demos; a node embeds its own implementation.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    /// Pending wakes as (time, address), canonical order
    pub wakes: BTreeSet<(Timestamp, Address)>,

    /// Notifications in arrival order
    pub notifications: Vec<(LifecycleEvent, Address, Vec<Address>)>,
}

impl RecordingScheduler {
    /// Create empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a wake pending for (address, time)?
    pub fn has_wake(&self, contract: &Address, at: Timestamp) -> bool {
        self.wakes.contains(&(at, contract.clone()))
    }

    /// Lifecycle events seen for one contract, in order
    pub fn events_for(&self, contract: &Address) -> Vec<LifecycleEvent> {
        self.notifications
            .iter()
            .filter(|(_, c, _)| c == contract)
            .map(|(e, _, _)| *e)
            .collect()
    }
}

impl LifecycleScheduler for RecordingScheduler {
    fn schedule_wake(&mut self, contract: &Address, at: Timestamp) {
        debug!(contract = %contract, at, "schedule wake");
        self.wakes.insert((at, contract.clone()));
    }

    fn cancel_wake(&mut self, contract: &Address, at: Timestamp) {
        debug!(contract = %contract, at, "cancel wake");
        self.wakes.remove(&(at, contract.clone()));
    }

    fn notify(&mut self, event: LifecycleEvent, contract: &Address, related: &[Address]) {
        debug!(contract = %contract, ?event, "lifecycle notification");
        self.notifications
            .push((event, contract.clone(), related.to_vec()));
    }
}

//! Deterministic delivery-versus-payment settlement engine.
//!
//! Evaluates multi-party, multi-asset settlement contracts against a
//! replicated ledger snapshot and either applies them atomically or
//! reports exactly why they cannot settle yet. Every replica feeding the
//! same snapshot the same event sequence reaches bit-identical state.
//!
//! # Architecture
//!
//! - [`contract`]: the DVP contract record, its store, and the state
//!   snapshot the engine operates on
//! - [`engine`]: the settlement state machine (`Time` and `Commit`
//!   events, dry-run and apply modes, the commit algorithm)
//! - [`eval`]: the arithmetic formula evaluator for contract amounts
//! - [`emitter`]: zero-sum checking and effective-transfer emission
//! - [`scheduler`]: the wake/notification seam to the host ledger
//! - [`config`]: engine tuning knobs
//!
//! # Invariants
//!
//! - All iteration is over ordered collections; no hash-order or clock
//!   dependence anywhere
//! - Dry-run invocations never mutate the snapshot or the scheduler
//! - An applied settlement is atomic: the snapshot holds either none or
//!   all of its effects, and per-asset deltas sum to zero

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(unused_qualifications)]

pub mod config;
pub mod contract;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod eval;
pub mod scheduler;

pub use config::EngineConfig;
pub use contract::{
    AddEncumbrance, AmountSpec, Authorisation, ContractEncumbrance, ContractFunction,
    ContractStore, DvpContract, Parameter, Party, PayItem, ReceiveItem, StateSnapshot,
};
pub use emitter::{EffectiveTransfer, SummaryEntry, TransferKind};
pub use engine::{DvpEngine, EngineResult, Status};
pub use error::{Error, Result};
pub use eval::{EvalError, Evaluator};
pub use scheduler::{LifecycleEvent, LifecycleScheduler, RecordingScheduler};

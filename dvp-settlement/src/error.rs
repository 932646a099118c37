//! Error taxonomy for the settlement evaluator
//!
//! Everything crosses the engine boundary by return value; severity
//! (hard in both modes, deferred to a retry, soft funds shortfall) is
//! decided by the engine's gate handling, not encoded here.

use crate::eval::EvalError;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement evaluator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Wrong contract type or address; hard in both modes
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Missing/refused signature, locked asset, malformed leg
    #[error("Validation failure: {0}")]
    Validation(String),

    /// A party cannot cover a payment leg yet
    #[error("Insufficient Asset: {0}")]
    FundsUnavailable(String),

    /// Formula could not be evaluated
    #[error("Evaluation failure for '{key}' on contract {address}: {source}")]
    Evaluation {
        /// Parameter key or item the formula belongs to
        key: String,
        /// Contract address
        address: String,
        /// Underlying evaluator error
        source: EvalError,
    },

    /// Encumbrance accumulation invariant violated; the snapshot itself is
    /// flagged corrupted and downstream processing must halt
    #[error("Corrupted state: {0}")]
    CorruptedState(String),
}

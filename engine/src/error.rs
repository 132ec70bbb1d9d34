//! Error types for the marksync engine.

use thiserror::Error;

/// All possible errors from the marksync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid change type: {0}")]
    InvalidChangeType(String),

    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(u64),

    // Resolution errors
    #[error("conflict resolution failed: {0}")]
    ConflictResolutionFailed(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

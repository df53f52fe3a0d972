//! Error types for forkstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ForkStoreError
pub type Result<T> = std::result::Result<T, ForkStoreError>;

/// Unified error type for forkstore operations
#[derive(Debug, Error)]
pub enum ForkStoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("State not found: {0}")]
    NotFound(String),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Branch '{0}' has no committed states")]
    EmptyBranch(String),

    // -------------------------------------------------------------------------
    // Branch Errors
    // -------------------------------------------------------------------------
    #[error("Branch '{0}' already exists")]
    BranchExists(String),

    #[error("Fork source not found: {0}")]
    SourceNotFound(String),

    #[error("Branch '{0}' is protected and cannot be deleted")]
    ProtectedBranch(String),

    #[error("Branch '{0}' is active and cannot be deleted")]
    ActiveBranch(String),

    // -------------------------------------------------------------------------
    // Ledger Errors
    // -------------------------------------------------------------------------
    #[error("Ledger conflict on branch '{branch}': {reason}")]
    LedgerConflict { branch: String, reason: String },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Write failed for {target}: {reason}")]
    WriteFailed { target: String, reason: String },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Payload / Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Control Errors
    // -------------------------------------------------------------------------
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ForkStoreError {
    /// Whether the caller can retry (possibly after reloading) instead of
    /// treating the failure as fatal to the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForkStoreError::NotFound(_)
                | ForkStoreError::LedgerConflict { .. }
                | ForkStoreError::Cancelled(_)
        )
    }

    pub(crate) fn write_failed(target: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        ForkStoreError::WriteFailed {
            target: target.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<bincode::Error> for ForkStoreError {
    fn from(err: bincode::Error) -> Self {
        ForkStoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ForkStoreError {
    fn from(err: serde_json::Error) -> Self {
        ForkStoreError::Serialization(err.to_string())
    }
}

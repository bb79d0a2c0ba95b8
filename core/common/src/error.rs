//! Common error types for PhantomVault.

use std::fmt;

use thiserror::Error;

/// Multi-step operation that can fail after partially committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOperation {
    Lock,
    Unlock,
}

impl fmt::Display for SagaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaOperation::Lock => write!(f, "lock"),
            SagaOperation::Unlock => write!(f, "unlock"),
        }
    }
}

/// What happened when the committed steps of a failed saga were undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// Every committed step was compensated; data is back where it started.
    RolledBack,
    /// A compensation failed. Data may be in an inconsistent location.
    RollbackFailed(String),
}

impl fmt::Display for CompensationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompensationOutcome::RolledBack => write!(f, "rolled back cleanly"),
            CompensationOutcome::RollbackFailed(reason) => {
                write!(f, "rollback also failed ({}), manual recovery required", reason)
            }
        }
    }
}

/// Context attached to a failed lock or unlock saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaFailure {
    pub operation: SagaOperation,
    pub folder_id: String,
    pub step: &'static str,
    pub cause: String,
    pub compensation: CompensationOutcome,
}

impl fmt::Display for SagaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of folder {} failed at step '{}': {}; {}",
            self.operation, self.folder_id, self.step, self.cause, self.compensation
        )
    }
}

/// Top-level error type for PhantomVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any state changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced profile or folder does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Password or recovery key mismatch.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Metadata store failed decryption or tag verification.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Multi-step operation failed after partially committing.
    #[error("Saga failed: {0}")]
    Saga(SagaFailure),

    /// Copy, move or backup failed.
    #[error("Resource error: {0}")]
    Resource(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for failures the caller can surface as a plain "no" without alarm.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::AlreadyExists(_)
                | Error::Authentication(_)
        )
    }

    /// True when a saga left data mid-transition and could not undo it.
    pub fn requires_manual_recovery(&self) -> bool {
        matches!(
            self,
            Error::Saga(SagaFailure {
                compensation: CompensationOutcome::RollbackFailed(_),
                ..
            })
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

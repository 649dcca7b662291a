//! Error types for the modsync synchronization layer
//!
//! Every public operation reports failures through [`SyncError`], whose five
//! variants are the only kinds the editing surface ever observes. Raw platform
//! errors (I/O, database, JSON) are translated at the boundary by the `From`
//! conversions below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for modsync operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Capability exists but is not currently granted
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Clone target already present and overwrite was not requested
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Expected manifest, script or record is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A picker was dismissed
    #[error("Cancelled by user")]
    UserCancelled,

    /// Unexpected host or database failure
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

/// Result type alias for modsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Serializable classification handed to the editing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    AlreadyExists,
    NotFound,
    UserCancelled,
    StorageFailure,
}

/// Error shape exposed in operation reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            SyncError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::UserCancelled => ErrorKind::UserCancelled,
            SyncError::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }

    /// Cancellation is absorbed silently by callers, never shown as a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::UserCancelled)
    }

    /// Whether asking the user again (re-prompt, confirm overwrite) can resolve it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::PermissionDenied(_) | SyncError::AlreadyExists(_) | SyncError::UserCancelled
        )
    }

    /// Prefix the message with the entity the operation was working on
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            SyncError::PermissionDenied(msg) => {
                SyncError::PermissionDenied(format!("{}: {}", context, msg))
            }
            SyncError::AlreadyExists(msg) => SyncError::AlreadyExists(format!("{}: {}", context, msg)),
            SyncError::NotFound(msg) => SyncError::NotFound(format!("{}: {}", context, msg)),
            SyncError::UserCancelled => SyncError::UserCancelled,
            SyncError::StorageFailure(msg) => {
                SyncError::StorageFailure(format!("{}: {}", context, msg))
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SyncError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => SyncError::PermissionDenied(err.to_string()),
            _ => SyncError::StorageFailure(format!("I/O error: {}", err)),
        }
    }
}

impl From<libsql::Error> for SyncError {
    fn from(err: libsql::Error) -> Self {
        SyncError::StorageFailure(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::StorageFailure(format!("Serialization error: {}", err))
    }
}

impl From<uuid::Error> for SyncError {
    fn from(err: uuid::Error) -> Self {
        SyncError::StorageFailure(format!("Invalid identifier: {}", err))
    }
}

//! Error types for the installed-software inventory.
//!
//! Errors fall into two groups. Recoverable failures (unreadable cache, failed
//! enumeration, I/O trouble during a rebuild) are absorbed by the cache
//! lifecycle controller through tier fallback. Contract violations (wrong
//! source type, mutating a predefined source) are surfaced to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the inventory cache.
#[derive(Debug, Error)]
pub enum InventoryError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Incompatible cache schema: expected {expected}, found {found}")]
    IncompatibleSchema { expected: String, found: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to acquire lock {name}: {message}")]
    Lock { name: String, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Enumeration errors
    #[error("Enumeration of {origin} failed: {message}")]
    Enumeration { origin: String, message: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    // Contract violations
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation {operation} is not supported by source type {source_type}")]
    UnsupportedOperation {
        operation: &'static str,
        source_type: String,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// A single optional field of an installed item that could not be read.
///
/// Enumerators report these per field so that one unreadable value degrades
/// the item instead of dropping it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Field {field} unavailable: {reason}")]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

// Conversion implementations for common error types

impl From<std::io::Error> for InventoryError {
    fn from(err: std::io::Error) -> Self {
        InventoryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for InventoryError {
    fn from(err: rusqlite::Error) -> Self {
        InventoryError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl InventoryError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        InventoryError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the cache controller may recover from this error by falling
    /// back to the next tier.
    ///
    /// Contract violations are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            InventoryError::InvalidArgument(_) | InventoryError::UnsupportedOperation { .. }
        )
    }
}

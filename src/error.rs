//! Error types for the coinbook core
//!
//! One thiserror-derived enum covers the whole crate: validation and
//! duplicate errors carry precise domain messages, storage errors carry the
//! operation that failed so the cause stays traceable.

use thiserror::Error;

/// The main error type for coinbook operations
#[derive(Error, Debug)]
pub enum CoinbookError {
    /// Validation errors for data caught before persistence
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uniqueness violation detected before insert
    #[error("{entity_type} already exists: {identifier}")]
    Duplicate {
        entity_type: &'static str,
        identifier: String,
    },

    /// Gateway used before open or after close
    #[error("Database connection is not open")]
    NotConnected,

    /// Unexpected persistence failure, wrapped with the failing operation
    #[error("Storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Raw SQLite errors surfaced by the storage gateway
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// CSV serialization failures
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoinbookError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a duplicate-entity error
    pub fn duplicate(entity_type: &'static str, identifier: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type,
            identifier: identifier.into(),
        }
    }

    /// Wrap a lower-level failure with the operation that was running.
    /// Domain errors (validation, duplicates) pass through unchanged so
    /// callers can still match on them.
    pub fn storage(operation: &'static str, source: CoinbookError) -> Self {
        match source {
            err @ (Self::Validation(_) | Self::Duplicate { .. } | Self::NotConnected) => err,
            err => Self::Storage {
                operation,
                message: err.to_string(),
            },
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a duplicate error
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type alias for coinbook operations
pub type CoinbookResult<T> = Result<T, CoinbookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoinbookError::validation("amount cannot be negative");
        assert_eq!(
            err.to_string(),
            "Validation error: amount cannot be negative"
        );
    }

    #[test]
    fn test_duplicate_error() {
        let err = CoinbookError::duplicate("Profile", "Personal");
        assert_eq!(err.to_string(), "Profile already exists: Personal");
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_storage_wrap_keeps_domain_errors() {
        let wrapped = CoinbookError::storage(
            "add entry",
            CoinbookError::validation("category cannot be empty"),
        );
        assert!(wrapped.is_validation());

        let wrapped = CoinbookError::storage(
            "add entry",
            CoinbookError::Sqlite(rusqlite::Error::InvalidQuery),
        );
        assert!(matches!(
            wrapped,
            CoinbookError::Storage {
                operation: "add entry",
                ..
            }
        ));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoinbookError = io_err.into();
        assert!(matches!(err, CoinbookError::Io(_)));
    }
}

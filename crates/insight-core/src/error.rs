//! Error types and result aliases for the insight store.
//!
//! One taxonomy is shared by every component. Storage backends, the typed
//! store, collectors and the provider all surface these variants so callers
//! can branch on the failure category rather than on message text.

use std::fmt;

/// The result type used throughout the insight crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in insight operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided (e.g. `from > to`).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A query range exceeded the configured maximum.
    #[error("range too large: {requested_secs}s requested, at most {max_secs}s allowed")]
    RangeTooLarge {
        /// Length of the requested range in seconds.
        requested_secs: i64,
        /// Configured maximum range in seconds.
        max_secs: i64,
    },

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A document could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The application or deployment catalogue failed to answer a listing.
    #[error("catalog error: {message}")]
    Catalog {
        /// Description of the listing failure.
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a serialization error describing the document at `path`.
    #[must_use]
    pub fn serialization(path: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::Serialization {
            message: format!("{path}: {cause}"),
        }
    }

    /// Creates a new catalog error.
    #[must_use]
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Returns true if this error is the not-found signal.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this error was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short, stable label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidId { .. } => "invalid_id",
            Self::InvalidInput(_) => "invalid_input",
            Self::RangeTooLarge { .. } => "range_too_large",
            Self::NotFound(_) => "not_found",
            Self::Storage { .. } => "storage",
            Self::Serialization { .. } => "serialization",
            Self::Catalog { .. } => "catalog",
            Self::Cancelled => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::storage("boom").is_not_found());
    }

    #[test]
    fn range_too_large_message_names_both_bounds() {
        let err = Error::RangeTooLarge {
            requested_secs: 10,
            max_secs: 5,
        };
        let message = err.to_string();
        assert!(message.contains("10s"));
        assert!(message.contains("5s"));
        assert_eq!(err.kind(), "range_too_large");
    }
}

//! Error types and result aliases for trove.
//!
//! This module defines the shared error types used across all trove crates.
//! Errors are structured for programmatic handling: the retry decorator
//! classifies them through [`Error::is_transient`] and only retries the
//! transient infrastructure class.

use std::fmt;

/// The result type used throughout trove.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trove store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A store operation failed for an infrastructure reason (node
    /// unreachable, execution timeout). Transient: eligible for retry.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No store node was reachable. Transient: eligible for retry.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the connectivity failure.
        message: String,
    },

    /// A retried operation failed on every attempt.
    #[error("operation '{operation}' failed after {attempts} attempts")]
    RetriesExhausted {
        /// The store operation that was retried.
        operation: &'static str,
        /// How many attempts were made.
        attempts: u32,
        /// The failure from the last attempt.
        #[source]
        source: Box<Error>,
    },

    /// A required resource was not found. Never retried.
    #[error("not found: {resource_type} with id {id}")]
    ResourceNotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Invalid input was provided. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

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

    /// Creates a new unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new resource not found error.
    #[must_use]
    pub fn resource_not_found(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::ResourceNotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the error belongs to the transient infrastructure
    /// class that the retry decorator is allowed to retry.
    ///
    /// Not-found conditions, invalid input and already-exhausted retries
    /// propagate immediately.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Unavailable { .. })
    }
}

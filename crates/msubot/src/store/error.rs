//! Error types for the document store.

use thiserror::Error;

/// Errors that can occur while talking to the document store.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The store could not be opened or is no longer usable
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// A query or fetch failed
    #[error("Failed to {operation} {target}: {message}")]
    Read {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// A merge, add or delete failed
    #[error("Failed to {operation} {target}: {message}")]
    Write {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// A document did not have the shape its collection requires
    #[error("Malformed document {document}: {message}")]
    DataShape { document: String, message: String },
}

impl StoreError {
    /// Returns true if retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Read { .. } | StoreError::Write { .. }
        )
    }

    pub(crate) fn read(operation: &'static str, target: impl ToString, err: impl ToString) -> Self {
        StoreError::Read {
            operation,
            target: target.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(operation: &'static str, target: impl ToString, err: impl ToString) -> Self {
        StoreError::Write {
            operation,
            target: target.to_string(),
            message: err.to_string(),
        }
    }
}

//! Queue and transfer error types.
//!
//! `TransferError` is what a transport reports when an operation fails; the
//! queue treats it as opaque data. `QueueError` is what the queue itself
//! produces. Both are serializable so they can travel inside events and run
//! summaries without depending on non-serializable types like `std::io::Error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{OperationId, QueueState};

/// Error reported by a transfer or probe operation.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferError {
    /// Network/HTTP error during the transfer.
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// I/O error while reading a request body or writing a response body.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The operation was cancelled (fail-fast, reset, or caller).
    #[error("Operation cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl TransferError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status code, if the failure carried one.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Network { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network {
                message,
                status_code: Some(code),
            } => format!("Request failed (HTTP {code}): {message}"),
            Self::Network { message, .. } => format!("Request failed: {message}"),
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Cancelled => "Request was cancelled.".to_string(),
            Self::Other { message } => message.clone(),
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

/// Error type for queue operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueError {
    /// An action was attempted outside the state that allows it.
    #[error("Cannot {action} while the queue is {state}")]
    InvalidState {
        /// What the caller tried to do (e.g. "enqueue").
        action: String,
        /// The state the queue was in.
        state: QueueState,
    },

    /// A transfer or probe reported failure.
    #[error("{label} failed: {source}")]
    OperationFailure {
        /// The failing operation.
        id: OperationId,
        /// Label of the failing operation.
        label: String,
        /// Underlying transport error.
        source: TransferError,
    },

    /// A terminal event arrived for an operation removed by `reset`.
    ///
    /// Produced internally and swallowed; never surfaced to observers.
    #[error("Stale callback for {id}")]
    StaleCallback {
        /// The operation the stale event referred to.
        id: OperationId,
    },
}

impl QueueError {
    /// Create an invalid state error.
    pub fn invalid_state(action: impl Into<String>, state: QueueState) -> Self {
        Self::InvalidState {
            action: action.into(),
            state,
        }
    }

    /// Create an operation failure.
    pub fn operation_failure(
        id: OperationId,
        label: impl Into<String>,
        source: TransferError,
    ) -> Self {
        Self::OperationFailure {
            id,
            label: label.into(),
            source,
        }
    }

    /// Create a stale callback error.
    #[must_use]
    pub const fn stale_callback(id: OperationId) -> Self {
        Self::StaleCallback { id }
    }

    /// The transport error behind an operation failure.
    #[must_use]
    pub const fn transfer_error(&self) -> Option<&TransferError> {
        match self {
            Self::OperationFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

//! HTTP adapter errors.

use netq_core::TransferError;
use thiserror::Error;

/// Failure inside the HTTP adapter.
///
/// Converted into the transport-agnostic `TransferError` before it reaches
/// the queue.
#[derive(Debug, Error)]
pub enum HttpTransferError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Redirect from {from} has an invalid Location: {location}")]
    InvalidRedirect { from: String, location: String },

    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("Redirect to {location} rejected by policy")]
    RedirectRejected { location: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl HttpTransferError {
    pub(crate) fn request(url: &reqwest::Url, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }

    /// HTTP status code, if the failure came from a response.
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<HttpTransferError> for TransferError {
    fn from(err: HttpTransferError) -> Self {
        match &err {
            HttpTransferError::Cancelled => Self::Cancelled,
            HttpTransferError::Io(io) => Self::from_io_error(io),
            HttpTransferError::Status { status, .. } => {
                Self::network_with_status(err.to_string(), *status)
            }
            HttpTransferError::Request { source, .. } => match source.status() {
                Some(status) => Self::network_with_status(err.to_string(), status.as_u16()),
                None => Self::network(err.to_string()),
            },
            HttpTransferError::InvalidRedirect { .. }
            | HttpTransferError::TooManyRedirects { .. }
            | HttpTransferError::RedirectRejected { .. } => Self::network(err.to_string()),
            HttpTransferError::Client(_) => Self::other(err.to_string()),
        }
    }
}

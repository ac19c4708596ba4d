//! Queue events - discriminated union for everything observers can see.

use serde::{Deserialize, Serialize};

use super::completion::QueueRunSummary;
use super::types::OperationId;

/// Response metadata reported by a transfer once headers arrive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub status: u16,
    /// Declared body length, if the response carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Response headers in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl ResponseInfo {
    /// Create response info with a status code.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            content_length: None,
            headers: Vec::new(),
        }
    }

    /// Set the declared body length.
    #[must_use]
    pub const fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Single discriminated union for all queue events.
///
/// This is the wire form of the observer notifications, used by event
/// streams and logs:
///
/// ```text
/// { "type": "request_started", "id": 1, "label": "GET https://..." }
/// { "type": "response_headers", "id": 1, "status": 200, "content_length": 10 }
/// { "type": "queue_finished", "summary": { ... } }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A transfer has started.
    RequestStarted {
        /// Operation id.
        id: OperationId,
        /// Operation label.
        label: String,
    },

    /// A transfer received its response headers.
    ResponseHeaders {
        /// Operation id.
        id: OperationId,
        /// HTTP status code.
        status: u16,
        /// Declared body length.
        #[serde(skip_serializing_if = "Option::is_none")]
        content_length: Option<u64>,
    },

    /// A transfer is about to follow a redirect.
    WillRedirect {
        /// Operation id.
        id: OperationId,
        /// Redirect target.
        location: String,
    },

    /// A transfer completed successfully.
    RequestFinished {
        /// Operation id.
        id: OperationId,
    },

    /// A transfer failed.
    RequestFailed {
        /// Operation id.
        id: OperationId,
        /// Error message describing what went wrong.
        error: String,
    },

    /// Every operation of the run reached a terminal state.
    QueueFinished {
        /// Summary of the run.
        summary: QueueRunSummary,
    },
}

impl QueueEvent {
    /// Get the operation id from any per-operation event.
    #[must_use]
    pub const fn id(&self) -> Option<OperationId> {
        match self {
            Self::QueueFinished { .. } => None,
            Self::RequestStarted { id, .. }
            | Self::ResponseHeaders { id, .. }
            | Self::WillRedirect { id, .. }
            | Self::RequestFinished { id }
            | Self::RequestFailed { id, .. } => Some(*id),
        }
    }

    /// Get the event name for wire protocols.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } => "queue:request_started",
            Self::ResponseHeaders { .. } => "queue:response_headers",
            Self::WillRedirect { .. } => "queue:will_redirect",
            Self::RequestFinished { .. } => "queue:request_finished",
            Self::RequestFailed { .. } => "queue:request_failed",
            Self::QueueFinished { .. } => "queue:finished",
        }
    }

    /// Whether this event ends the run.
    #[must_use]
    pub const fn is_queue_finished(&self) -> bool {
        matches!(self, Self::QueueFinished { .. })
    }
}

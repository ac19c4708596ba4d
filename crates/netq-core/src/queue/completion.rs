//! Queue run completion types.
//!
//! A queue run spans one `go` call up to the moment every operation has
//! reached a terminal state. These types summarize what happened during the
//! run, distinct from the individual per-operation events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::OperationId;

/// Result kind for a single transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// Completed successfully.
    Finished,
    /// Failed with an error.
    Failed,
    /// Cancelled by fail-fast or reset.
    Cancelled,
}

/// Details for a single transfer in a queue run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDetail {
    /// Operation id.
    pub id: OperationId,
    /// Operation label.
    pub label: String,
    /// How the transfer ended.
    pub result: CompletionKind,
    /// Error message if the transfer failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the failure was passed to failure observers. Failures that
    /// race a fail-fast cancellation are recorded but not reported.
    #[serde(default)]
    pub reported: bool,
    /// Bytes uploaded by this transfer.
    pub uploaded: u64,
    /// Bytes downloaded by this transfer.
    pub downloaded: u64,
}

/// Summary of an entire queue run from `go` to drain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRunSummary {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// Unix timestamp (milliseconds since epoch) when the run started.
    pub started_at_ms: u64,
    /// Unix timestamp (milliseconds since epoch) when the run drained.
    pub completed_at_ms: u64,
    /// Number of transfers that finished successfully.
    pub finished: u32,
    /// Number of transfers that failed.
    pub failed: u32,
    /// Number of transfers that were cancelled.
    pub cancelled: u32,
    /// Whether fail-fast cancellation was triggered during the run.
    pub cancelled_on_failure: bool,
    /// Aggregate bytes uploaded.
    pub uploaded_bytes: u64,
    /// Aggregate upload total.
    pub upload_total: u64,
    /// Aggregate bytes downloaded.
    pub downloaded_bytes: u64,
    /// Aggregate download total.
    pub download_total: u64,
    /// Opaque metadata attached to the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Value>,
    /// Per-transfer records in registration order.
    pub items: Vec<OperationDetail>,
}

impl QueueRunSummary {
    /// Total number of transfers across all result kinds.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.finished + self.failed + self.cancelled
    }

    /// Whether every transfer finished successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Look up the record for one transfer.
    #[must_use]
    pub fn item(&self, id: OperationId) -> Option<&OperationDetail> {
        self.items.iter().find(|item| item.id == id)
    }
}

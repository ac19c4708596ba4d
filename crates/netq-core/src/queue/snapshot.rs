//! Queue snapshot DTOs.

use serde::{Deserialize, Serialize};

use super::types::{OperationId, OperationRole, OperationStatus, QueueState};

/// One registered operation as seen in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Operation id.
    pub id: OperationId,
    /// Operation label.
    pub label: String,
    /// Transfer or probe.
    pub role: OperationRole,
    /// Current status.
    pub status: OperationStatus,
}

/// Point-in-time view of a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Lifecycle state.
    pub state: QueueState,
    /// Real transfers not yet terminal (probes excluded).
    pub requests_count: usize,
    /// All operations (transfers and probes) not yet terminal.
    pub active_count: usize,
    /// Bytes uploaded so far.
    pub uploaded_so_far: u64,
    /// Known upload total.
    pub upload_total: u64,
    /// Bytes downloaded so far.
    pub downloaded_so_far: u64,
    /// Known download total.
    pub download_total: u64,
    /// Registered operations in registration order.
    pub operations: Vec<OperationSummary>,
}

impl QueueSnapshot {
    /// Number of operations with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: OperationStatus) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == status)
            .count()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

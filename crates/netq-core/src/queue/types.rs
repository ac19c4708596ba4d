//! Core domain types for the network queue.
//!
//! Pure data types with no I/O dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for an operation registered with a queue.
///
/// Ids are minted by the queue in registration order and are never reused
/// within the lifetime of a queue, even across resets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    /// Create an operation id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Direction of a byte counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Bytes sent in request bodies.
    Upload,
    /// Bytes received in response bodies.
    Download,
}

impl Direction {
    /// Both directions, upload first.
    pub const ALL: [Self; 2] = [Self::Upload, Self::Download];

    /// Stable string form used in logs and wire formats.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }

    /// Position of this direction in `ALL`, for per-direction arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Upload => 0,
            Self::Download => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Accepting registrations; nothing runs until `go`.
    #[default]
    Suspended,
    /// Size probes are running; transfers wait for them.
    Sizing,
    /// Transfers are running.
    Running,
    /// A failure triggered fail-fast; remaining operations are being cancelled.
    Cancelling,
    /// Every operation reached a terminal state.
    Drained,
}

impl QueueState {
    /// Stable string form used in logs and wire formats.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Suspended => "suspended",
            Self::Sizing => "sizing",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Drained => "drained",
        }
    }

    /// True once the current run has been started and is not yet over.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Sizing | Self::Running | Self::Cancelling)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an operation is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationRole {
    /// A real transfer registered by the caller.
    Transfer,
    /// A size probe synthesized for a transfer in accurate-progress mode.
    Probe,
}

/// Status of a single operation within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Registered, not yet started.
    Pending,
    /// Started and not yet terminal.
    Running,
    /// Completed successfully.
    Finished,
    /// Completed with an error.
    Failed,
    /// Cancelled by fail-fast or reset.
    Cancelled,
}

impl OperationStatus {
    /// Whether no further events can occur for the operation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    /// Stable string form used in logs and wire formats.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Payload handed to observers describing the originating operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    /// Operation id.
    pub id: OperationId,
    /// Human-readable label supplied by the operation (usually its URL).
    pub label: String,
    /// Transfer or probe.
    pub role: OperationRole,
    /// For probes, the transfer whose size they discover.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_for: Option<OperationId>,
}

impl OperationInfo {
    /// Describe a transfer.
    pub fn transfer(id: OperationId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            role: OperationRole::Transfer,
            probe_for: None,
        }
    }

    /// Describe a probe linked to `transfer`.
    pub fn probe(id: OperationId, label: impl Into<String>, transfer: OperationId) -> Self {
        Self {
            id,
            label: label.into(),
            role: OperationRole::Probe,
            probe_for: Some(transfer),
        }
    }

    /// Whether this is a real transfer.
    #[must_use]
    pub const fn is_transfer(&self) -> bool {
        matches!(self.role, OperationRole::Transfer)
    }
}

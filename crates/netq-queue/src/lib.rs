//! Coordinating queue for concurrent network transfers.
//!
//! `NetworkQueue` runs many transfer operations at once, aggregates their
//! byte-level progress into upload and download fractions, cancels the rest
//! of a run on the first failure (fail-fast), and can probe download sizes
//! before counting any download (accurate progress).
//!
//! # Structure
//!
//! - `controller` - `NetworkQueue`, run state machine and task scheduling
//! - `progress` - `ProgressAggregator` and the `ProgressThrottle` for sinks
//! - `observer` - Per-notification observer traits and `ChannelObserver`
//! - `completion` - Single-fire `CompletionNotifier`

#![deny(unused_crate_dependencies)]

mod completion;
mod controller;
mod lease;
pub mod observer;
mod progress;

pub use completion::CompletionNotifier;
pub use controller::NetworkQueue;
pub use observer::{
    ChannelObserver, QueueFinished, QueueObservers, RequestFailed, RequestFinished,
    RequestStarted, ResponseHeadersReceived, WillRedirect,
};
pub use progress::{ProgressAggregator, ProgressThrottle, ProgressTotals};

// Re-export core types for convenience
pub use netq_core::{
    CompletionKind, Direction, NoopProgressSink, OperationDetail, OperationId, OperationInfo,
    OperationRole, OperationStatus, ProbeOperation, ProgressSink, QueueConfig, QueueError,
    QueueEvent, QueueResult, QueueRunSummary, QueueSnapshot, QueueState, ResponseInfo,
    TransferContext, TransferError, TransferOperation, TransferReporter,
};

#[cfg(test)]
use tokio_test as _;

//! Core domain types and port definitions for netq.
//!
//! This crate has no runtime: it defines the vocabulary shared by the queue
//! controller (`netq-queue`), transport adapters (`netq-http`) and the CLI.
//!
//! - `queue` - identifiers, states, errors, events and run summaries
//! - `ports` - traits for transfer operations, size probes and progress sinks

#![deny(unused_crate_dependencies)]

pub mod ports;
pub mod queue;

pub use ports::{
    NoopProgressSink, NoopTransferReporter, ProbeOperation, ProgressSink, TransferContext,
    TransferOperation, TransferReporter,
};
pub use queue::{
    CompletionKind, Direction, OperationDetail, OperationId, OperationInfo, OperationRole,
    OperationStatus, OperationSummary, QueueConfig, QueueError, QueueEvent, QueueResult,
    QueueRunSummary, QueueSnapshot, QueueState, ResponseInfo, TransferError,
};

#[cfg(test)]
use tokio_test as _;

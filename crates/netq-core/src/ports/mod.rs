//! Port definitions (trait abstractions) for the queue's collaborators.
//!
//! The queue never touches sockets, headers or widgets. It consumes
//! transfer operations and probes through these traits and reports
//! progress into sinks.
//!
//! # Design Rules
//!
//! - Only domain types in signatures (no `reqwest` or UI types)
//! - Transports own retries, timeouts and redirects
//! - Sinks are borrowed by the queue, never owned

pub mod progress_sink;
pub mod transfer;

pub use progress_sink::{NoopProgressSink, ProgressSink};
pub use transfer::{
    NoopTransferReporter, ProbeOperation, TransferContext, TransferOperation, TransferReporter,
};

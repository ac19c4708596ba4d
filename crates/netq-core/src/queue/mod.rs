//! Queue domain types, events, errors, and run summaries.
//!
//! Pure data types for the network queue. No I/O, networking, or runtime
//! dependencies allowed.
//!
//! # Structure
//!
//! - `types` - Identifiers and state enums (`OperationId`, `QueueState`, `Direction`)
//! - `config` - Staged queue configuration (`QueueConfig`)
//! - `errors` - `QueueError` and the transport-level `TransferError`
//! - `events` - Serializable `QueueEvent` union for event streams
//! - `completion` - Queue run completion summary types
//! - `snapshot` - Point-in-time queue snapshots

pub mod completion;
pub mod config;
pub mod errors;
pub mod events;
pub mod snapshot;
pub mod types;

pub use completion::{CompletionKind, OperationDetail, QueueRunSummary};
pub use config::QueueConfig;
pub use errors::{QueueError, QueueResult, TransferError};
pub use events::{QueueEvent, ResponseInfo};
pub use snapshot::{OperationSummary, QueueSnapshot};
pub use types::{Direction, OperationId, OperationInfo, OperationRole, OperationStatus, QueueState};

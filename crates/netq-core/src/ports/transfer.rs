//! Transfer and probe operation ports.
//!
//! A `TransferOperation` is one upload or download. The queue starts it by
//! calling `run` with a `TransferContext`, cancels it through the context's
//! token, and learns about its progress through the context's reporter.
//! The future returned by `run` resolving is the terminal event.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::queue::{Direction, OperationId, ResponseInfo, TransferError};

/// Port for a single network transfer.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl TransferOperation for MyGet {
///     fn label(&self) -> String { format!("GET {}", self.url) }
///     fn direction(&self) -> Direction { Direction::Download }
///
///     async fn run(&self, ctx: TransferContext) -> Result<(), TransferError> {
///         let response = self.send().await?;
///         ctx.add_download_total(response.len);
///         while let Some(chunk) = response.next_chunk().await? {
///             ctx.add_download_progress(chunk.len() as u64);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TransferOperation: Send + Sync {
    /// Human-readable label, typically `METHOD url`.
    fn label(&self) -> String;

    /// Primary direction: `Download` for GET-style transfers whose response
    /// body is the payload, `Upload` for transfers that send a body.
    fn direction(&self) -> Direction;

    /// Size in the primary direction, when known before the transfer starts.
    ///
    /// A declared size is counted toward the queue total when the run starts
    /// and later total reports in that direction are ignored.
    fn declared_size(&self) -> Option<u64> {
        None
    }

    /// A cheap operation that discovers the download size without fetching
    /// the body. Only consulted in accurate-progress mode.
    fn size_probe(&self) -> Option<Arc<dyn ProbeOperation>> {
        None
    }

    /// Perform the transfer.
    ///
    /// Implementations should stop promptly once `ctx` is cancelled; the
    /// queue also drops the future when cancellation wins the race.
    async fn run(&self, ctx: TransferContext) -> Result<(), TransferError>;
}

/// Port for a size probe (HEAD-style request).
#[async_trait]
pub trait ProbeOperation: Send + Sync {
    /// Human-readable label, typically `HEAD url`.
    fn label(&self) -> String;

    /// Discover the size of the linked transfer.
    ///
    /// `Ok(None)` means the server answered without declaring a size.
    async fn probe(&self, cancel: CancellationToken) -> Result<Option<u64>, TransferError>;
}

/// Receiver for byte counters and response metadata from a running transfer.
///
/// Implemented by the queue; every call is safe from any thread and never
/// blocks on I/O.
pub trait TransferReporter: Send + Sync {
    /// The transfer learned that `bytes` more will move in `direction`.
    fn add_to_total(&self, direction: Direction, bytes: u64);

    /// The transfer moved `bytes` more in `direction`.
    fn add_progress(&self, direction: Direction, bytes: u64);

    /// Response headers arrived.
    fn response_headers(&self, response: &ResponseInfo);

    /// The transfer is about to follow a redirect to `location`.
    fn will_redirect(&self, location: &str);
}

/// Reporter that discards everything, for running operations outside a queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransferReporter;

impl TransferReporter for NoopTransferReporter {
    fn add_to_total(&self, _direction: Direction, _bytes: u64) {}

    fn add_progress(&self, _direction: Direction, _bytes: u64) {}

    fn response_headers(&self, _response: &ResponseInfo) {}

    fn will_redirect(&self, _location: &str) {}
}

/// Everything a running transfer gets from the queue.
#[derive(Clone)]
pub struct TransferContext {
    id: OperationId,
    cancel: CancellationToken,
    reporter: Arc<dyn TransferReporter>,
}

impl TransferContext {
    /// Create a context.
    pub fn new(
        id: OperationId,
        cancel: CancellationToken,
        reporter: Arc<dyn TransferReporter>,
    ) -> Self {
        Self {
            id,
            cancel,
            reporter,
        }
    }

    /// A context not attached to any queue.
    #[must_use]
    pub fn detached(cancel: CancellationToken) -> Self {
        Self::new(OperationId::new(0), cancel, Arc::new(NoopTransferReporter))
    }

    /// Id of the running operation.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// Cancellation token for this run of the operation.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the queue has cancelled this operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the queue cancels this operation.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Declare `bytes` more to upload.
    pub fn add_upload_total(&self, bytes: u64) {
        self.reporter.add_to_total(Direction::Upload, bytes);
    }

    /// Record `bytes` uploaded.
    pub fn add_upload_progress(&self, bytes: u64) {
        self.reporter.add_progress(Direction::Upload, bytes);
    }

    /// Declare `bytes` more to download.
    pub fn add_download_total(&self, bytes: u64) {
        self.reporter.add_to_total(Direction::Download, bytes);
    }

    /// Record `bytes` downloaded.
    pub fn add_download_progress(&self, bytes: u64) {
        self.reporter.add_progress(Direction::Download, bytes);
    }

    /// Report received response headers.
    pub fn response_headers(&self, response: &ResponseInfo) {
        self.reporter.response_headers(response);
    }

    /// Report an imminent redirect.
    pub fn will_redirect(&self, location: &str) {
        self.reporter.will_redirect(location);
    }
}

impl std::fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferContext")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

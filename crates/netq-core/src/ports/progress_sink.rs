//! Progress sink port.
//!
//! A sink receives the queue's aggregate fraction complete. The queue holds
//! sinks weakly: it never keeps a widget alive, and a sink that has been
//! dropped is skipped silently.

/// Port for receiving aggregate progress.
///
/// Both methods receive a fraction in `[0.0, 1.0]` that never decreases
/// within one run. They are called with no queue lock held, so a sink may
/// read the queue. Calls are serialized and sit on the reporting path of a
/// transfer, so implementations should return quickly.
pub trait ProgressSink: Send + Sync {
    /// Aggregate upload progress changed.
    fn on_upload_progress(&self, _fraction: f64) {}

    /// Aggregate download progress changed.
    fn on_download_progress(&self, _fraction: f64) {}
}

/// A sink that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}

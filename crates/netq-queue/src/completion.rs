//! Single-fire completion notifier.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use netq_core::QueueRunSummary;

use crate::controller::NetworkQueue;
use crate::observer::QueueFinished;

/// Delivers the end of one run to its `QueueFinished` observer.
///
/// Armed when the run starts. `fire` delivers at most once per notifier, and
/// `disarm` (used by `reset`) stops an abandoned run from ever reporting
/// completion. Clones share the same arm state.
#[derive(Clone)]
pub struct CompletionNotifier {
    observer: Option<Arc<dyn QueueFinished>>,
    armed: Arc<AtomicBool>,
}

impl CompletionNotifier {
    /// Create an armed notifier.
    pub fn new(observer: Option<Arc<dyn QueueFinished>>) -> Self {
        Self {
            observer,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the notifier can still fire.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Prevent any future `fire` from delivering.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    /// Deliver `summary` if still armed. Returns whether this call delivered.
    pub fn fire(&self, queue: &NetworkQueue, summary: &QueueRunSummary) -> bool {
        if !self.armed.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(observer) = &self.observer {
            observer.queue_finished(queue, summary);
        }
        true
    }
}

impl std::fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("observer", &self.observer.is_some())
            .field("armed", &self.is_armed())
            .finish()
    }
}

//! Queue configuration.

use std::num::NonZeroUsize;

/// Configuration for a network queue.
///
/// The queue keeps a staged copy that setters mutate freely; the staged
/// copy is pinned when `go` is called and stays fixed for that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Probe download sizes before counting progress.
    pub accurate_progress: bool,
    /// Cancel every remaining operation when one transfer fails.
    pub cancel_on_failure: bool,
    /// Ceiling on concurrently running operations (`None` = unbounded).
    pub max_concurrent: Option<NonZeroUsize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            accurate_progress: false,
            cancel_on_failure: true,
            max_concurrent: None,
        }
    }
}

impl QueueConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable accurate-progress probing.
    #[must_use]
    pub const fn with_accurate_progress(mut self, enabled: bool) -> Self {
        self.accurate_progress = enabled;
        self
    }

    /// Enable or disable fail-fast cancellation.
    #[must_use]
    pub const fn with_cancel_on_failure(mut self, enabled: bool) -> Self {
        self.cancel_on_failure = enabled;
        self
    }

    /// Set the concurrency ceiling. Zero means unbounded.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = NonZeroUsize::new(max);
        self
    }
}

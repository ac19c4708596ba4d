//! Run leases.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lease for one run of a queue.
///
/// Every `go` and every `reset` mints a new lease. Work spawned for a run
/// carries the lease it was started under, and anything it reports after the
/// queue moved on to a newer lease is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LeaseId(u64);

/// Source of monotonically increasing leases.
#[derive(Debug, Default)]
pub(crate) struct LeaseCounter(AtomicU64);

impl LeaseCounter {
    /// Mint a lease never handed out before by this counter.
    pub(crate) fn mint(&self) -> LeaseId {
        LeaseId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

//! Network queue controller.
//!
//! `NetworkQueue` owns the run state machine, the registration list and the
//! scheduling of operations onto tokio tasks.
//!
//! # Concurrency Model
//!
//! - Every operation runs on its own spawned task
//! - Controller state sits behind one `std::sync::Mutex`, never held across `.await`
//! - A `Semaphore` enforces the optional concurrency ceiling
//! - Lease tokens reject terminal events from a run abandoned by `reset`
//! - Observers are called from a per-run dispatcher task, outside all locks
//! - Progress sinks are called after every lock is released
//! - Lock order: controller → progress (consistent everywhere)

mod run;
mod task;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use netq_core::{
    Direction, OperationId, OperationInfo, OperationStatus, OperationSummary, ProbeOperation,
    ProgressSink, QueueConfig, QueueError, QueueResult, QueueSnapshot, QueueState, TransferError,
    TransferOperation,
};

use crate::lease::{LeaseCounter, LeaseId};
use crate::observer::QueueObservers;
use crate::progress::ProgressAggregator;

use run::{RunMessage, RunRecord};

/// What an entry runs.
enum Work {
    Transfer(Arc<dyn TransferOperation>),
    Probe {
        probe: Arc<dyn ProbeOperation>,
        /// The transfer whose size this probe discovers.
        transfer: OperationId,
    },
}

/// One registered operation.
struct OperationEntry {
    info: OperationInfo,
    work: Work,
    status: OperationStatus,
    cancel: CancellationToken,
    /// A task has been spawned for this entry in the current run.
    spawned: bool,
    error: Option<TransferError>,
    /// The failure was delivered to `RequestFailed` observers.
    reported: bool,
}

impl OperationEntry {
    fn new(info: OperationInfo, work: Work) -> Self {
        Self {
            info,
            work,
            status: OperationStatus::Pending,
            cancel: CancellationToken::new(),
            spawned: false,
            error: None,
            reported: false,
        }
    }
}

struct QueueInner {
    state: QueueState,
    lease: LeaseId,
    /// Mutated by setters at any time.
    staged: QueueConfig,
    /// Copied from `staged` by `go`; fixed for the run.
    pinned: QueueConfig,
    operations: IndexMap<OperationId, OperationEntry>,
    /// Transfer id → probe id.
    probe_links: HashMap<OperationId, OperationId>,
    active_count: usize,
    pending_probes: usize,
    next_id: u64,
    observers: QueueObservers,
    user_info: Option<serde_json::Value>,
    run: Option<RunRecord>,
}

impl QueueInner {
    fn new(lease: LeaseId, config: QueueConfig) -> Self {
        Self {
            state: QueueState::Suspended,
            lease,
            staged: config,
            pinned: config,
            operations: IndexMap::new(),
            probe_links: HashMap::new(),
            active_count: 0,
            pending_probes: 0,
            next_id: 0,
            observers: QueueObservers::default(),
            user_info: None,
            run: None,
        }
    }

    /// Ids are never reused, even across resets.
    const fn mint_id(&mut self) -> OperationId {
        self.next_id += 1;
        OperationId::new(self.next_id)
    }

    fn requests_count(&self) -> usize {
        self.operations
            .values()
            .filter(|entry| entry.info.is_transfer() && !entry.status.is_terminal())
            .count()
    }

    /// Synthesize and link a size probe for `transfer` when it qualifies:
    /// a download of unknown size that can produce a probe.
    fn attach_probe(&mut self, transfer: OperationId) {
        if self.probe_links.contains_key(&transfer) {
            return;
        }

        let probe = match self.operations.get(&transfer).map(|entry| &entry.work) {
            Some(Work::Transfer(op))
                if op.direction() == Direction::Download && op.declared_size().is_none() =>
            {
                op.size_probe()
            }
            _ => None,
        };
        let Some(probe) = probe else {
            return;
        };

        let id = self.mint_id();
        let info = OperationInfo::probe(id, probe.label(), transfer);
        tracing::debug!(
            target: "netq.queue",
            id = %id,
            transfer = %transfer,
            label = %info.label,
            "Size probe attached"
        );
        self.operations
            .insert(id, OperationEntry::new(info, Work::Probe { probe, transfer }));
        self.probe_links.insert(transfer, id);
        self.active_count += 1;
    }

    /// Bring probes in line with the pinned accurate-progress setting.
    fn reconcile_probes(&mut self) {
        if self.pinned.accurate_progress {
            let transfers: Vec<OperationId> = self
                .operations
                .iter()
                .filter(|(_, entry)| entry.info.is_transfer())
                .map(|(id, _)| *id)
                .collect();
            for id in transfers {
                self.attach_probe(id);
            }
        } else if !self.probe_links.is_empty() {
            self.operations.retain(|_, entry| entry.info.is_transfer());
            self.probe_links.clear();
        }
    }

    /// Whether `transfer` has no probe or its probe is terminal.
    fn probe_settled(&self, transfer: OperationId) -> bool {
        self.probe_links.get(&transfer).is_none_or(|probe| {
            self.operations
                .get(probe)
                .is_none_or(|entry| entry.status.is_terminal())
        })
    }

    /// Queue a message for this run's observers.
    fn send(&self, message: RunMessage) {
        if let Some(run) = &self.run {
            // Dispatcher gone: the run was abandoned.
            let _ = run.events.send(message);
        }
    }
}

/// Coordinating queue for concurrent network transfers.
///
/// Register operations with `enqueue` while the queue is suspended, then call
/// `go`. The queue tracks aggregate upload and download progress, enforces
/// the optional fail-fast policy, and in accurate-progress mode probes
/// download sizes before any download starts.
///
/// # Example
///
/// ```ignore
/// let queue = NetworkQueue::new();
/// queue.set_download_progress_sink(&bar);
/// queue.enqueue(Arc::new(HttpTransfer::get(client, url)))?;
/// queue.go();
/// ```
pub struct NetworkQueue {
    inner: Mutex<QueueInner>,
    progress: Arc<ProgressAggregator>,
    leases: LeaseCounter,
}

impl NetworkQueue {
    /// Create a suspended queue with the default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(QueueConfig::default())
    }

    /// Create a suspended queue with `config` staged.
    pub fn with_config(config: QueueConfig) -> Arc<Self> {
        let leases = LeaseCounter::default();
        let lease = leases.mint();
        Arc::new(Self {
            inner: Mutex::new(QueueInner::new(lease, config)),
            progress: Arc::new(ProgressAggregator::new(lease)),
            leases,
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a transfer.
    ///
    /// Only allowed while the queue is suspended. With accurate progress
    /// staged, a download of unknown size also gets a linked size probe.
    pub fn enqueue(&self, operation: Arc<dyn TransferOperation>) -> QueueResult<OperationId> {
        let mut inner = self.lock();
        if inner.state != QueueState::Suspended {
            return Err(QueueError::invalid_state("enqueue", inner.state));
        }

        let id = inner.mint_id();
        let info = OperationInfo::transfer(id, operation.label());
        tracing::debug!(target: "netq.queue", id = %id, label = %info.label, "Operation enqueued");
        inner
            .operations
            .insert(id, OperationEntry::new(info, Work::Transfer(operation)));
        inner.active_count += 1;

        if inner.staged.accurate_progress {
            inner.attach_probe(id);
        }
        Ok(id)
    }

    /// Start the run.
    ///
    /// Does nothing unless the queue is suspended, so calling it twice is
    /// harmless. Returns immediately; operations run on spawned tasks and a
    /// queue with no operations drains at once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn go(self: &Arc<Self>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.state != QueueState::Suspended {
            tracing::debug!(target: "netq.queue", state = %inner.state, "go ignored: run already started");
            return;
        }

        inner.pinned = inner.staged;
        inner.reconcile_probes();

        let lease = self.leases.mint();
        inner.lease = lease;
        inner.active_count = inner.operations.len();
        inner.pending_probes = inner.probe_links.len();
        let sizing = inner.pending_probes > 0;

        self.progress.begin_run(lease, sizing);
        let emissions: Vec<_> = inner
            .operations
            .iter()
            .filter_map(|(id, entry)| match &entry.work {
                Work::Transfer(op) => op
                    .declared_size()
                    .and_then(|size| self.progress.lock_total(lease, *id, op.direction(), size)),
                Work::Probe { .. } => None,
            })
            .collect();

        let run = RunRecord::start(self, &inner.observers, inner.pinned.max_concurrent);
        tracing::info!(
            target: "netq.queue",
            run_id = %run.run_id,
            operations = inner.operations.len(),
            probes = inner.pending_probes,
            max_concurrent = ?inner.pinned.max_concurrent,
            cancel_on_failure = inner.pinned.cancel_on_failure,
            "Queue run STARTED"
        );
        inner.run = Some(run);

        if inner.active_count == 0 {
            inner.state = QueueState::Running;
            self.drain(inner);
        } else if sizing {
            inner.state = QueueState::Sizing;
            let probes: Vec<OperationId> = inner
                .operations
                .iter()
                .filter(|(_, entry)| !entry.info.is_transfer())
                .map(|(id, _)| *id)
                .collect();
            for id in probes {
                self.spawn_operation(inner, id);
            }
        } else {
            inner.state = QueueState::Running;
            self.spawn_ready_transfers(inner);
        }

        drop(guard);
        for emission in emissions {
            self.progress.deliver(emission);
        }
    }

    /// Hard reset: cancel everything and return to suspended.
    ///
    /// Discards operations, counters, observers and progress sinks. An
    /// undrained run never reports completion. Keeps the staged configuration
    /// and user info. Safe from any state.
    pub fn reset(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let previous = inner.state;

        let mut cancelled = 0_usize;
        for entry in inner.operations.values() {
            if !entry.status.is_terminal() {
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        if let Some(run) = inner.run.take() {
            run.abandon();
        }

        let lease = self.leases.mint();
        inner.lease = lease;
        inner.state = QueueState::Suspended;
        inner.operations.clear();
        inner.probe_links.clear();
        inner.active_count = 0;
        inner.pending_probes = 0;
        inner.observers = QueueObservers::default();
        self.progress.reset(lease);

        tracing::info!(target: "netq.queue", previous = %previous, cancelled, "Queue reset");
    }

    /// A fresh suspended queue with the same staged configuration, observers,
    /// progress sinks and user info, but no operations.
    pub fn duplicate(&self) -> Arc<Self> {
        let inner = self.lock();
        let copy = Self::with_config(inner.staged);
        {
            let mut target = copy.lock();
            target.observers = inner.observers.clone();
            target.user_info.clone_from(&inner.user_info);
        }
        for direction in Direction::ALL {
            copy.progress
                .set_sink(direction, self.progress.sink(direction));
        }
        copy
    }

    /// Lifecycle state.
    pub fn state(&self) -> QueueState {
        self.lock().state
    }

    /// Real transfers not yet terminal. Size probes are not counted.
    pub fn requests_count(&self) -> usize {
        self.lock().requests_count()
    }

    /// Operations, probes included, not yet terminal.
    pub fn active_count(&self) -> usize {
        self.lock().active_count
    }

    /// Aggregate progress counters.
    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    /// Aggregate upload fraction in `[0.0, 1.0]`.
    pub fn upload_progress(&self) -> f64 {
        self.progress.fraction(Direction::Upload)
    }

    /// Aggregate download fraction in `[0.0, 1.0]`.
    pub fn download_progress(&self) -> f64 {
        self.progress.fraction(Direction::Download)
    }

    /// Point-in-time view of the queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.lock();
        let totals = self.progress.totals();
        QueueSnapshot {
            state: inner.state,
            requests_count: inner.requests_count(),
            active_count: inner.active_count,
            uploaded_so_far: totals.uploaded,
            upload_total: totals.upload_total,
            downloaded_so_far: totals.downloaded,
            download_total: totals.download_total,
            operations: inner
                .operations
                .values()
                .map(|entry| OperationSummary {
                    id: entry.info.id,
                    label: entry.info.label.clone(),
                    role: entry.info.role,
                    status: entry.status,
                })
                .collect(),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The staged configuration.
    pub fn config(&self) -> QueueConfig {
        self.lock().staged
    }

    /// Replace the staged configuration. Takes effect at the next `go`.
    pub fn set_config(&self, config: QueueConfig) {
        self.lock().staged = config;
    }

    /// Stage accurate-progress mode.
    pub fn set_accurate_progress(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.staged = inner.staged.with_accurate_progress(enabled);
    }

    /// Stage the fail-fast policy.
    pub fn set_cancel_on_failure(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.staged = inner.staged.with_cancel_on_failure(enabled);
    }

    /// Stage the concurrency ceiling. Zero means unbounded.
    pub fn set_max_concurrent(&self, max: usize) {
        let mut inner = self.lock();
        inner.staged = inner.staged.with_max_concurrent(max);
    }

    pub fn user_info(&self) -> Option<serde_json::Value> {
        self.lock().user_info.clone()
    }

    /// Attach opaque metadata, echoed in every run summary.
    pub fn set_user_info(&self, user_info: Option<serde_json::Value>) {
        self.lock().user_info = user_info;
    }

    /// Replace the registered observers. Takes effect at the next `go`.
    pub fn set_observers(&self, observers: QueueObservers) {
        self.lock().observers = observers;
    }

    /// Borrow `sink` for aggregate upload progress. The queue keeps only a
    /// weak reference; dropping the sink silently stops updates.
    pub fn set_upload_progress_sink<S: ProgressSink + 'static>(&self, sink: &Arc<S>) {
        let weak: Weak<dyn ProgressSink> = Arc::downgrade(sink) as Weak<dyn ProgressSink>;
        self.progress.set_sink(Direction::Upload, Some(weak));
    }

    /// Borrow `sink` for aggregate download progress.
    pub fn set_download_progress_sink<S: ProgressSink + 'static>(&self, sink: &Arc<S>) {
        let weak: Weak<dyn ProgressSink> = Arc::downgrade(sink) as Weak<dyn ProgressSink>;
        self.progress.set_sink(Direction::Download, Some(weak));
    }

    /// Stop forwarding progress to any sink.
    pub fn clear_progress_sinks(&self) {
        for direction in Direction::ALL {
            self.progress.set_sink(direction, None);
        }
    }

    // =========================================================================
    // Run transitions (caller holds the controller lock)
    // =========================================================================

    /// Spawn every transfer whose probe, if any, is terminal.
    fn spawn_ready_transfers(self: &Arc<Self>, inner: &mut QueueInner) {
        let ready: Vec<OperationId> = inner
            .operations
            .iter()
            .filter(|(id, entry)| {
                entry.info.is_transfer()
                    && !entry.spawned
                    && !entry.status.is_terminal()
                    && inner.probe_settled(**id)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in ready {
            self.spawn_operation(inner, id);
        }
    }

    /// Fail-fast: cancel every non-terminal operation except `failed`.
    ///
    /// Entries without a task become terminal immediately; spawned ones
    /// report their cancellation through their task.
    fn cancel_remaining(&self, inner: &mut QueueInner, failed: OperationId) {
        inner.state = QueueState::Cancelling;
        if let Some(run) = inner.run.as_mut() {
            run.cancelled_on_failure = true;
        }

        let lease = inner.lease;
        let mut swept = 0_usize;
        let mut signalled = 0_usize;
        for (id, entry) in &mut inner.operations {
            if *id == failed || entry.status.is_terminal() {
                continue;
            }
            entry.cancel.cancel();
            if entry.spawned {
                signalled += 1;
            } else {
                entry.status = OperationStatus::Cancelled;
                self.progress.close(lease, *id);
                swept += 1;
            }
        }
        inner.active_count = inner.active_count.saturating_sub(swept);

        tracing::info!(
            target: "netq.queue",
            failed = %failed,
            signalled,
            swept,
            "Fail-fast: cancelling remaining operations"
        );
    }

    /// Every operation is terminal: seal progress and hand the summary to
    /// the dispatcher.
    fn drain(&self, inner: &mut QueueInner) {
        inner.state = QueueState::Drained;
        let totals = self.progress.seal(inner.lease);

        let Some(run) = inner.run.take() else {
            tracing::warn!(target: "netq.queue", "Queue drained but no run record found");
            return;
        };
        let summary = run.summarize(inner, &self.progress, totals);

        tracing::info!(
            target: "netq.queue",
            run_id = %summary.run_id,
            finished = summary.finished,
            failed = summary.failed,
            cancelled = summary.cancelled,
            downloaded = summary.downloaded_bytes,
            uploaded = summary.uploaded_bytes,
            "Queue run COMPLETED"
        );
        run.finish(summary);
    }
}

impl std::fmt::Debug for NetworkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("NetworkQueue")
            .field("state", &inner.state)
            .field("operations", &inner.operations.len())
            .field("active_count", &inner.active_count)
            .field("config", &inner.staged)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netq_core::{OperationRole, TransferContext};

    struct Fixed {
        direction: Direction,
        declared: Option<u64>,
        probe: bool,
    }

    struct NullProbe;

    #[async_trait]
    impl ProbeOperation for NullProbe {
        fn label(&self) -> String {
            "HEAD /".to_string()
        }

        async fn probe(&self, _cancel: CancellationToken) -> Result<Option<u64>, TransferError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl TransferOperation for Fixed {
        fn label(&self) -> String {
            "GET /".to_string()
        }

        fn direction(&self) -> Direction {
            self.direction
        }

        fn declared_size(&self) -> Option<u64> {
            self.declared
        }

        fn size_probe(&self) -> Option<Arc<dyn ProbeOperation>> {
            self.probe.then(|| Arc::new(NullProbe) as Arc<dyn ProbeOperation>)
        }

        async fn run(&self, _ctx: TransferContext) -> Result<(), TransferError> {
            Ok(())
        }
    }

    fn download(declared: Option<u64>, probe: bool) -> Arc<dyn TransferOperation> {
        Arc::new(Fixed {
            direction: Direction::Download,
            declared,
            probe,
        })
    }

    #[test]
    fn probes_attach_only_to_unsized_downloads() {
        let queue = NetworkQueue::with_config(QueueConfig::new().with_accurate_progress(true));
        queue.enqueue(download(None, true)).unwrap();
        queue.enqueue(download(Some(10), true)).unwrap();
        queue.enqueue(download(None, false)).unwrap();
        queue
            .enqueue(Arc::new(Fixed {
                direction: Direction::Upload,
                declared: None,
                probe: true,
            }))
            .unwrap();

        let snapshot = queue.snapshot();
        let probes = snapshot
            .operations
            .iter()
            .filter(|op| op.role == OperationRole::Probe)
            .count();
        assert_eq!(probes, 1);
        assert_eq!(queue.requests_count(), 4);
        assert_eq!(queue.active_count(), 5);
    }

    #[test]
    fn accurate_progress_is_reconciled_when_pinned() {
        let queue = NetworkQueue::with_config(QueueConfig::new().with_accurate_progress(true));
        queue.enqueue(download(None, true)).unwrap();

        let mut inner = queue.lock();
        inner.pinned = inner.staged.with_accurate_progress(false);
        inner.reconcile_probes();
        assert_eq!(inner.operations.len(), 1);
        assert!(inner.probe_links.is_empty());

        inner.pinned = inner.pinned.with_accurate_progress(true);
        inner.reconcile_probes();
        assert_eq!(inner.operations.len(), 2);
        assert_eq!(inner.probe_links.len(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_reset() {
        let queue = NetworkQueue::new();
        let first = queue.enqueue(download(None, false)).unwrap();
        queue.reset();
        let second = queue.enqueue(download(None, false)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn staged_config_setters() {
        let queue = NetworkQueue::new();
        queue.set_accurate_progress(true);
        queue.set_cancel_on_failure(false);
        queue.set_max_concurrent(2);

        let config = queue.config();
        assert!(config.accurate_progress);
        assert!(!config.cancel_on_failure);
        assert_eq!(config.max_concurrent.map(std::num::NonZeroUsize::get), Some(2));
    }

    #[test]
    fn duplicate_copies_settings_not_operations() {
        let queue = NetworkQueue::with_config(QueueConfig::new().with_max_concurrent(3));
        queue.set_user_info(Some(serde_json::json!({ "batch": 7 })));
        queue.enqueue(download(None, false)).unwrap();

        let copy = queue.duplicate();
        assert_eq!(copy.config(), queue.config());
        assert_eq!(copy.user_info(), queue.user_info());
        assert_eq!(copy.state(), QueueState::Suspended);
        assert!(copy.snapshot().is_empty());
    }
}

//! Operation tasks and their terminal handling.
//!
//! Each operation runs on its own task: wait for a concurrency slot, mark
//! started, race the operation against its cancellation token, then report
//! the terminal result back to the controller under the run's lease.

use std::sync::Arc;

use netq_core::{
    Direction, OperationId, OperationInfo, OperationStatus, ProbeOperation, QueueError,
    QueueState, ResponseInfo, TransferContext, TransferError, TransferOperation, TransferReporter,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::run::RunMessage;
use super::{NetworkQueue, QueueInner, Work};
use crate::lease::LeaseId;
use crate::progress::ProgressAggregator;

/// `TransferReporter` handed to a running transfer.
///
/// Counters go straight to the aggregator; headers and redirects go to the
/// run's dispatcher. Both are tied to the lease of the run that spawned it.
struct OperationReporter {
    info: OperationInfo,
    lease: LeaseId,
    progress: Arc<ProgressAggregator>,
    events: mpsc::UnboundedSender<RunMessage>,
}

impl TransferReporter for OperationReporter {
    fn add_to_total(&self, direction: Direction, bytes: u64) {
        self.progress
            .add_to_total(self.lease, self.info.id, direction, bytes);
    }

    fn add_progress(&self, direction: Direction, bytes: u64) {
        self.progress
            .add_progress(self.lease, self.info.id, direction, bytes);
    }

    fn response_headers(&self, response: &ResponseInfo) {
        let _ = self
            .events
            .send(RunMessage::Headers(self.info.clone(), response.clone()));
    }

    fn will_redirect(&self, location: &str) {
        let _ = self
            .events
            .send(RunMessage::Redirect(self.info.clone(), location.to_string()));
    }
}

/// Outcome of claiming the start of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    Proceed,
    /// Cancelled while waiting for its slot; never reported as started.
    Cancelled,
    /// Stale or already terminal.
    Skip,
}

/// Held for as long as an operation occupies a concurrency slot.
struct Slot {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Wait for a concurrency slot. `None` when cancelled first.
async fn acquire_slot(
    limiter: Option<Arc<Semaphore>>,
    cancel: &CancellationToken,
) -> Option<Slot> {
    if cancel.is_cancelled() {
        return None;
    }
    let Some(limiter) = limiter else {
        return Some(Slot { _permit: None });
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        permit = limiter.acquire_owned() => Some(Slot { _permit: permit.ok() }),
    }
}

async fn run_transfer(
    queue: Arc<NetworkQueue>,
    lease: LeaseId,
    id: OperationId,
    operation: Arc<dyn TransferOperation>,
    cancel: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
    reporter: Arc<OperationReporter>,
) {
    let Some(_slot) = acquire_slot(limiter, &cancel).await else {
        queue.finish_transfer(lease, id, Err(TransferError::Cancelled));
        return;
    };
    match queue.mark_started(lease, id) {
        Start::Proceed => {}
        Start::Cancelled => {
            queue.finish_transfer(lease, id, Err(TransferError::Cancelled));
            return;
        }
        Start::Skip => return,
    }

    let ctx = TransferContext::new(id, cancel.clone(), reporter);
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransferError::Cancelled),
        result = operation.run(ctx) => result,
    };
    queue.finish_transfer(lease, id, result);
}

async fn run_probe(
    queue: Arc<NetworkQueue>,
    lease: LeaseId,
    id: OperationId,
    probe: Arc<dyn ProbeOperation>,
    cancel: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
) {
    let Some(_slot) = acquire_slot(limiter, &cancel).await else {
        queue.finish_probe(lease, id, Err(TransferError::Cancelled));
        return;
    };
    match queue.mark_started(lease, id) {
        Start::Proceed => {}
        Start::Cancelled => {
            queue.finish_probe(lease, id, Err(TransferError::Cancelled));
            return;
        }
        Start::Skip => return,
    }

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransferError::Cancelled),
        result = probe.probe(cancel.clone()) => result,
    };
    queue.finish_probe(lease, id, result);
}

fn log_stale(id: OperationId) {
    tracing::debug!(
        target: "netq.queue",
        error = %QueueError::stale_callback(id),
        "Ignoring stale callback (lease mismatch)"
    );
}

impl NetworkQueue {
    /// Spawn the task for one entry of the current run.
    pub(super) fn spawn_operation(self: &Arc<Self>, inner: &mut QueueInner, id: OperationId) {
        let lease = inner.lease;
        let Some(run) = inner.run.as_ref() else {
            return;
        };
        let limiter = run.limiter.clone();
        let events = run.events.clone();

        let Some(entry) = inner.operations.get_mut(&id) else {
            return;
        };
        if entry.spawned || entry.status.is_terminal() {
            return;
        }
        entry.spawned = true;
        let cancel = entry.cancel.clone();

        tracing::debug!(target: "netq.queue", id = %id, label = %entry.info.label, "Operation scheduled");

        match &entry.work {
            Work::Transfer(operation) => {
                let reporter = Arc::new(OperationReporter {
                    info: entry.info.clone(),
                    lease,
                    progress: Arc::clone(&self.progress),
                    events,
                });
                tokio::spawn(run_transfer(
                    Arc::clone(self),
                    lease,
                    id,
                    Arc::clone(operation),
                    cancel,
                    limiter,
                    reporter,
                ));
            }
            Work::Probe { probe, .. } => {
                tokio::spawn(run_probe(
                    Arc::clone(self),
                    lease,
                    id,
                    Arc::clone(probe),
                    cancel,
                    limiter,
                ));
            }
        }
    }

    /// Record that an operation's task got its slot.
    fn mark_started(&self, lease: LeaseId, id: OperationId) -> Start {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.lease != lease {
            log_stale(id);
            return Start::Skip;
        }
        let Some(entry) = inner.operations.get_mut(&id) else {
            return Start::Skip;
        };
        if entry.status.is_terminal() {
            return Start::Skip;
        }
        if entry.cancel.is_cancelled() {
            return Start::Cancelled;
        }

        entry.status = OperationStatus::Running;
        tracing::debug!(target: "netq.queue", id = %id, label = %entry.info.label, "Operation started");
        if entry.info.is_transfer() {
            let message = RunMessage::Started(entry.info.clone());
            inner.send(message);
        }
        Start::Proceed
    }

    /// Terminal handling for a transfer.
    fn finish_transfer(
        self: &Arc<Self>,
        lease: LeaseId,
        id: OperationId,
        result: Result<(), TransferError>,
    ) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.lease != lease {
            log_stale(id);
            return;
        }

        let state = inner.state;
        let fail_fast = inner.pinned.cancel_on_failure;
        let Some(entry) = inner.operations.get_mut(&id) else {
            log_stale(id);
            return;
        };
        if entry.status.is_terminal() {
            return;
        }
        self.progress.close(lease, id);

        let mut trigger_fail_fast = false;
        let message = match result {
            Ok(()) => {
                entry.status = OperationStatus::Finished;
                tracing::debug!(target: "netq.queue", id = %id, label = %entry.info.label, "Transfer finished");
                Some(RunMessage::Finished(entry.info.clone()))
            }
            Err(error) if error.is_cancelled() => {
                entry.status = OperationStatus::Cancelled;
                tracing::debug!(target: "netq.queue", id = %id, label = %entry.info.label, "Transfer cancelled");
                None
            }
            Err(error) => {
                entry.status = OperationStatus::Failed;
                entry.error = Some(error.clone());
                if state == QueueState::Cancelling {
                    tracing::debug!(
                        target: "netq.queue",
                        id = %id,
                        error = %error,
                        "Failure suppressed while cancelling"
                    );
                    None
                } else {
                    entry.reported = true;
                    trigger_fail_fast = fail_fast;
                    tracing::warn!(
                        target: "netq.queue",
                        id = %id,
                        label = %entry.info.label,
                        error = %error,
                        "Transfer failed"
                    );
                    let failure =
                        QueueError::operation_failure(id, entry.info.label.clone(), error);
                    Some(RunMessage::Failed(entry.info.clone(), failure))
                }
            }
        };

        if let Some(message) = message {
            inner.send(message);
        }
        inner.active_count = inner.active_count.saturating_sub(1);

        if trigger_fail_fast {
            self.cancel_remaining(inner, id);
        }
        if inner.active_count == 0 {
            self.drain(inner);
        }
    }

    /// Terminal handling for a size probe.
    ///
    /// A discovered size is locked in as the linked transfer's download
    /// total. Probe failures are logged and otherwise ignored: the transfer
    /// still runs and reports its own total.
    fn finish_probe(
        self: &Arc<Self>,
        lease: LeaseId,
        id: OperationId,
        result: Result<Option<u64>, TransferError>,
    ) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.lease != lease {
            log_stale(id);
            return;
        }

        let Some(entry) = inner.operations.get_mut(&id) else {
            log_stale(id);
            return;
        };
        let Work::Probe { transfer, .. } = &entry.work else {
            return;
        };
        let transfer = *transfer;
        if entry.status.is_terminal() {
            return;
        }

        let mut emission = None;
        match result {
            Ok(size) => {
                entry.status = OperationStatus::Finished;
                tracing::debug!(target: "netq.queue", id = %id, transfer = %transfer, size = ?size, "Size probe finished");
                if let Some(size) = size {
                    emission = self
                        .progress
                        .lock_total(lease, transfer, Direction::Download, size);
                }
            }
            Err(error) if error.is_cancelled() => {
                entry.status = OperationStatus::Cancelled;
            }
            Err(error) => {
                entry.status = OperationStatus::Failed;
                tracing::debug!(
                    target: "netq.queue",
                    id = %id,
                    transfer = %transfer,
                    error = %error,
                    "Size probe failed; transfer will report its own total"
                );
                entry.error = Some(error);
            }
        }

        inner.pending_probes = inner.pending_probes.saturating_sub(1);
        inner.active_count = inner.active_count.saturating_sub(1);

        if inner.pending_probes == 0 && inner.state == QueueState::Sizing {
            inner.state = QueueState::Running;
            self.progress.open_download_gate(lease);
            tracing::info!(target: "netq.queue", "Sizing complete, starting transfers");
            self.spawn_ready_transfers(inner);
        }
        if inner.active_count == 0 {
            self.drain(inner);
        }

        drop(guard);
        if let Some(emission) = emission {
            self.progress.deliver(emission);
        }
    }
}

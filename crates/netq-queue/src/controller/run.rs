//! Per-run record and observer dispatch.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use netq_core::{
    CompletionKind, OperationDetail, OperationInfo, OperationStatus, QueueError, QueueRunSummary,
    ResponseInfo,
};
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

use super::{NetworkQueue, QueueInner};
use crate::completion::CompletionNotifier;
use crate::observer::QueueObservers;
use crate::progress::{ProgressAggregator, ProgressTotals};

/// Notification queued for a run's observers.
pub(super) enum RunMessage {
    Started(OperationInfo),
    Headers(OperationInfo, ResponseInfo),
    Redirect(OperationInfo, String),
    Finished(OperationInfo),
    Failed(OperationInfo, QueueError),
    Drained(QueueRunSummary),
}

/// State for one run, from `go` to drain or reset.
pub(super) struct RunRecord {
    pub(super) run_id: Uuid,
    started_at_ms: u64,
    pub(super) events: mpsc::UnboundedSender<RunMessage>,
    pub(super) limiter: Option<Arc<Semaphore>>,
    notifier: CompletionNotifier,
    pub(super) cancelled_on_failure: bool,
}

impl RunRecord {
    /// Start a run and its dispatcher task.
    pub(super) fn start(
        queue: &Arc<NetworkQueue>,
        observers: &QueueObservers,
        max_concurrent: Option<NonZeroUsize>,
    ) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let notifier = CompletionNotifier::new(observers.queue_finished.clone());

        tokio::spawn(dispatch(
            Arc::downgrade(queue),
            observers.clone(),
            notifier.clone(),
            rx,
        ));

        Self {
            run_id: Uuid::new_v4(),
            started_at_ms: now_ms(),
            events,
            limiter: max_concurrent.map(|max| Arc::new(Semaphore::new(max.get()))),
            notifier,
            cancelled_on_failure: false,
        }
    }

    /// Drop the run without reporting completion.
    pub(super) fn abandon(self) {
        self.notifier.disarm();
    }

    /// Hand the final summary to the dispatcher.
    pub(super) fn finish(self, summary: QueueRunSummary) {
        let _ = self.events.send(RunMessage::Drained(summary));
    }

    /// Build the run summary from the drained registrations.
    pub(super) fn summarize(
        &self,
        inner: &QueueInner,
        progress: &ProgressAggregator,
        totals: ProgressTotals,
    ) -> QueueRunSummary {
        let mut summary = QueueRunSummary {
            run_id: self.run_id,
            started_at_ms: self.started_at_ms,
            completed_at_ms: now_ms(),
            finished: 0,
            failed: 0,
            cancelled: 0,
            cancelled_on_failure: self.cancelled_on_failure,
            uploaded_bytes: totals.uploaded,
            upload_total: totals.upload_total,
            downloaded_bytes: totals.downloaded,
            download_total: totals.download_total,
            user_info: inner.user_info.clone(),
            items: Vec::new(),
        };

        for entry in inner.operations.values().filter(|e| e.info.is_transfer()) {
            let result = match entry.status {
                OperationStatus::Finished => {
                    summary.finished += 1;
                    CompletionKind::Finished
                }
                OperationStatus::Failed => {
                    summary.failed += 1;
                    CompletionKind::Failed
                }
                OperationStatus::Pending | OperationStatus::Running | OperationStatus::Cancelled => {
                    summary.cancelled += 1;
                    CompletionKind::Cancelled
                }
            };
            let (uploaded, downloaded) = progress.operation_bytes(entry.info.id);

            summary.items.push(OperationDetail {
                id: entry.info.id,
                label: entry.info.label.clone(),
                result,
                error: entry.error.as_ref().map(ToString::to_string),
                reported: entry.reported,
                uploaded,
                downloaded,
            });
        }

        summary
    }
}

/// Deliver a run's notifications in order until it drains or is abandoned.
async fn dispatch(
    queue: Weak<NetworkQueue>,
    observers: QueueObservers,
    notifier: CompletionNotifier,
    mut rx: mpsc::UnboundedReceiver<RunMessage>,
) {
    while let Some(message) = rx.recv().await {
        if !notifier.is_armed() {
            break;
        }

        match message {
            RunMessage::Started(info) => {
                if let Some(observer) = &observers.request_started {
                    observer.request_started(&info);
                }
            }
            RunMessage::Headers(info, response) => {
                if let Some(observer) = &observers.response_headers {
                    observer.response_headers(&info, &response);
                }
            }
            RunMessage::Redirect(info, location) => {
                if let Some(observer) = &observers.will_redirect {
                    observer.will_redirect(&info, &location);
                }
            }
            RunMessage::Finished(info) => {
                if let Some(observer) = &observers.request_finished {
                    observer.request_finished(&info);
                }
            }
            RunMessage::Failed(info, error) => {
                if let Some(observer) = &observers.request_failed {
                    observer.request_failed(&info, &error);
                }
            }
            RunMessage::Drained(summary) => {
                match queue.upgrade() {
                    Some(queue) => {
                        notifier.fire(&queue, &summary);
                    }
                    None => notifier.disarm(),
                }
                break;
            }
        }
    }
}

fn now_ms() -> u64 {
    use std::time::SystemTime;

    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(0)
}

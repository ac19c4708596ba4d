//! Observer capabilities.
//!
//! Each notification the queue can deliver is its own trait, so a caller
//! implements only what it cares about and registers it in `QueueObservers`.
//! All callbacks of one run are delivered in order on a single task, never
//! while the queue's locks are held, so observers may call back into the
//! queue (including `reset`).
//!
//! Callbacks are delivered only for real transfers. Size probes are internal.

use std::fmt;
use std::sync::Arc;

use netq_core::{OperationInfo, QueueError, QueueEvent, QueueRunSummary, ResponseInfo};
use tokio::sync::mpsc;

use crate::controller::NetworkQueue;

/// A transfer started running.
pub trait RequestStarted: Send + Sync {
    fn request_started(&self, info: &OperationInfo);
}

/// A transfer received response headers.
pub trait ResponseHeadersReceived: Send + Sync {
    fn response_headers(&self, info: &OperationInfo, response: &ResponseInfo);
}

/// A transfer is about to follow a redirect.
pub trait WillRedirect: Send + Sync {
    fn will_redirect(&self, info: &OperationInfo, location: &str);
}

/// A transfer finished successfully.
pub trait RequestFinished: Send + Sync {
    fn request_finished(&self, info: &OperationInfo);
}

/// A transfer failed.
///
/// Under fail-fast only the failure that triggered cancellation is delivered.
pub trait RequestFailed: Send + Sync {
    fn request_failed(&self, info: &OperationInfo, error: &QueueError);
}

/// Every operation of a run reached a terminal state.
///
/// Delivered exactly once per run, unless the run is reset first.
pub trait QueueFinished: Send + Sync {
    fn queue_finished(&self, queue: &NetworkQueue, summary: &QueueRunSummary);
}

/// The set of observers registered with a queue.
///
/// Observers are captured when `go` is called; changes made while a run is
/// in flight apply to the next run. `reset` clears them.
#[derive(Clone, Default)]
pub struct QueueObservers {
    pub request_started: Option<Arc<dyn RequestStarted>>,
    pub response_headers: Option<Arc<dyn ResponseHeadersReceived>>,
    pub will_redirect: Option<Arc<dyn WillRedirect>>,
    pub request_finished: Option<Arc<dyn RequestFinished>>,
    pub request_failed: Option<Arc<dyn RequestFailed>>,
    pub queue_finished: Option<Arc<dyn QueueFinished>>,
}

impl QueueObservers {
    /// No observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one object for every notification.
    pub fn all<T>(observer: &Arc<T>) -> Self
    where
        T: RequestStarted
            + ResponseHeadersReceived
            + WillRedirect
            + RequestFinished
            + RequestFailed
            + QueueFinished
            + 'static,
    {
        Self {
            request_started: Some(observer.clone()),
            response_headers: Some(observer.clone()),
            will_redirect: Some(observer.clone()),
            request_finished: Some(observer.clone()),
            request_failed: Some(observer.clone()),
            queue_finished: Some(observer.clone()),
        }
    }

    #[must_use]
    pub fn with_request_started(mut self, observer: Arc<dyn RequestStarted>) -> Self {
        self.request_started = Some(observer);
        self
    }

    #[must_use]
    pub fn with_response_headers(mut self, observer: Arc<dyn ResponseHeadersReceived>) -> Self {
        self.response_headers = Some(observer);
        self
    }

    #[must_use]
    pub fn with_will_redirect(mut self, observer: Arc<dyn WillRedirect>) -> Self {
        self.will_redirect = Some(observer);
        self
    }

    #[must_use]
    pub fn with_request_finished(mut self, observer: Arc<dyn RequestFinished>) -> Self {
        self.request_finished = Some(observer);
        self
    }

    #[must_use]
    pub fn with_request_failed(mut self, observer: Arc<dyn RequestFailed>) -> Self {
        self.request_failed = Some(observer);
        self
    }

    #[must_use]
    pub fn with_queue_finished(mut self, observer: Arc<dyn QueueFinished>) -> Self {
        self.queue_finished = Some(observer);
        self
    }
}

impl fmt::Debug for QueueObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueObservers")
            .field("request_started", &self.request_started.is_some())
            .field("response_headers", &self.response_headers.is_some())
            .field("will_redirect", &self.will_redirect.is_some())
            .field("request_finished", &self.request_finished.is_some())
            .field("request_failed", &self.request_failed.is_some())
            .field("queue_finished", &self.queue_finished.is_some())
            .finish()
    }
}

/// Observer that forwards every notification as a `QueueEvent` on a channel.
///
/// Useful for composition roots that prefer a stream over callbacks, and for
/// awaiting the end of a run.
///
/// # Example
///
/// ```ignore
/// let (observer, mut events) = ChannelObserver::new();
/// queue.set_observers(QueueObservers::all(&observer));
/// queue.go();
/// while let Some(event) = events.recv().await {
///     if let QueueEvent::QueueFinished { summary } = event {
///         break;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn emit(&self, event: QueueEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl RequestStarted for ChannelObserver {
    fn request_started(&self, info: &OperationInfo) {
        self.emit(QueueEvent::RequestStarted {
            id: info.id,
            label: info.label.clone(),
        });
    }
}

impl ResponseHeadersReceived for ChannelObserver {
    fn response_headers(&self, info: &OperationInfo, response: &ResponseInfo) {
        self.emit(QueueEvent::ResponseHeaders {
            id: info.id,
            status: response.status,
            content_length: response.content_length,
        });
    }
}

impl WillRedirect for ChannelObserver {
    fn will_redirect(&self, info: &OperationInfo, location: &str) {
        self.emit(QueueEvent::WillRedirect {
            id: info.id,
            location: location.to_string(),
        });
    }
}

impl RequestFinished for ChannelObserver {
    fn request_finished(&self, info: &OperationInfo) {
        self.emit(QueueEvent::RequestFinished { id: info.id });
    }
}

impl RequestFailed for ChannelObserver {
    fn request_failed(&self, info: &OperationInfo, error: &QueueError) {
        self.emit(QueueEvent::RequestFailed {
            id: info.id,
            error: error.to_string(),
        });
    }
}

impl QueueFinished for ChannelObserver {
    fn queue_finished(&self, _queue: &NetworkQueue, summary: &QueueRunSummary) {
        self.emit(QueueEvent::QueueFinished {
            summary: summary.clone(),
        });
    }
}

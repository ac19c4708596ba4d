//! Shared mocks for `NetworkQueue` integration tests.
//!
//! Mock transfers move a fixed number of bytes in chunks with an optional
//! delay, then succeed or fail. No network access is involved.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netq_queue::{
    ChannelObserver, Direction, NetworkQueue, ProbeOperation, ProgressSink, QueueEvent,
    QueueObservers, QueueRunSummary, ResponseInfo, TransferContext, TransferError,
    TransferOperation,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

// ── Mock transfer ──────────────────────────────────────────────────

/// Shared probe/transfer counters for ordering and concurrency checks.
#[derive(Default)]
pub struct Gauge {
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
    pub probes_done: AtomicUsize,
    pub ordering_violated: AtomicBool,
}

impl Gauge {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockTransfer {
    label: String,
    direction: Direction,
    size: u64,
    declared: bool,
    report_total: bool,
    chunks: u64,
    delay: Duration,
    failure: Option<TransferError>,
    hang: bool,
    probe: Option<Arc<MockProbe>>,
    gauge: Option<Arc<Gauge>>,
    /// Probes that must be done before this transfer may start.
    requires_probes: usize,
    pub runs: AtomicUsize,
    pub token: Mutex<Option<CancellationToken>>,
}

impl MockTransfer {
    pub fn download(label: &str, size: u64) -> Self {
        Self::new(label, Direction::Download, size)
    }

    pub fn upload(label: &str, size: u64) -> Self {
        Self::new(label, Direction::Upload, size)
    }

    fn new(label: &str, direction: Direction, size: u64) -> Self {
        Self {
            label: label.to_string(),
            direction,
            size,
            declared: false,
            report_total: true,
            chunks: 1,
            delay: Duration::ZERO,
            failure: None,
            hang: false,
            probe: None,
            gauge: None,
            requires_probes: 0,
            runs: AtomicUsize::new(0),
            token: Mutex::new(None),
        }
    }

    /// Size known up front instead of reported at run time.
    pub fn declared(mut self) -> Self {
        self.declared = true;
        self.report_total = false;
        self
    }

    pub fn chunks(mut self, chunks: u64) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, error: TransferError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Never finish on its own; only cancellation ends it.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn probed(mut self, probe: MockProbe) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    pub fn gauge(mut self, gauge: Arc<Gauge>, requires_probes: usize) -> Self {
        self.gauge = Some(gauge);
        self.requires_probes = requires_probes;
        self
    }

    pub fn was_cancelled(&self) -> bool {
        self.token
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn has_started(&self) -> bool {
        self.runs.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl TransferOperation for MockTransfer {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn declared_size(&self) -> Option<u64> {
        self.declared.then_some(self.size)
    }

    fn size_probe(&self) -> Option<Arc<dyn ProbeOperation>> {
        self.probe
            .clone()
            .map(|probe| probe as Arc<dyn ProbeOperation>)
    }

    async fn run(&self, ctx: TransferContext) -> Result<(), TransferError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = Some(ctx.cancel_token().clone());

        if let Some(gauge) = &self.gauge {
            if gauge.probes_done.load(Ordering::SeqCst) < self.requires_probes {
                gauge.ordering_violated.store(true, Ordering::SeqCst);
            }
            gauge.enter();
        }

        let result = self.transfer(&ctx).await;

        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }
        result
    }
}

impl MockTransfer {
    async fn transfer(&self, ctx: &TransferContext) -> Result<(), TransferError> {
        if self.report_total {
            match self.direction {
                Direction::Upload => ctx.add_upload_total(self.size),
                Direction::Download => ctx.add_download_total(self.size),
            }
        }
        ctx.response_headers(&ResponseInfo::new(200).with_content_length(Some(self.size)));

        if self.hang {
            ctx.cancelled().await;
            return Err(TransferError::Cancelled);
        }

        let chunks = self.chunks.max(1);
        let chunk = self.size / chunks;
        for index in 0..chunks {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let bytes = if index + 1 == chunks {
                self.size - chunk * (chunks - 1)
            } else {
                chunk
            };
            match self.direction {
                Direction::Upload => ctx.add_upload_progress(bytes),
                Direction::Download => ctx.add_download_progress(bytes),
            }
        }

        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

// ── Mock probe ─────────────────────────────────────────────────────

pub struct MockProbe {
    result: Result<Option<u64>, TransferError>,
    delay: Duration,
    gauge: Option<Arc<Gauge>>,
}

impl MockProbe {
    pub fn sized(size: u64) -> Self {
        Self {
            result: Ok(Some(size)),
            delay: Duration::ZERO,
            gauge: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(TransferError::network_with_status("HEAD rejected", 405)),
            delay: Duration::ZERO,
            gauge: None,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }
}

#[async_trait]
impl ProbeOperation for MockProbe {
    fn label(&self) -> String {
        "HEAD mock".to_string()
    }

    async fn probe(&self, _cancel: CancellationToken) -> Result<Option<u64>, TransferError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.probes_done.fetch_add(1, Ordering::SeqCst);
        }
        self.result.clone()
    }
}

// ── Sinks and observers ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub upload: Mutex<Vec<f64>>,
    pub download: Mutex<Vec<f64>>,
}

impl RecordingSink {
    pub fn downloads(&self) -> Vec<f64> {
        self.download.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<f64> {
        self.upload.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_upload_progress(&self, fraction: f64) {
        self.upload.lock().unwrap().push(fraction);
    }

    fn on_download_progress(&self, fraction: f64) {
        self.download.lock().unwrap().push(fraction);
    }
}

/// Register a `ChannelObserver` for every notification.
pub fn observe(queue: &NetworkQueue) -> UnboundedReceiver<QueueEvent> {
    let (observer, rx) = ChannelObserver::new();
    queue.set_observers(QueueObservers::all(&observer));
    rx
}

/// Collect events until the run finishes.
pub async fn wait_for_summary(
    rx: &mut UnboundedReceiver<QueueEvent>,
) -> (Vec<QueueEvent>, QueueRunSummary) {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("queue did not finish in time")
            .expect("observer channel closed");
        if let QueueEvent::QueueFinished { summary } = &event {
            let summary = summary.clone();
            events.push(event);
            return (events, summary);
        }
        events.push(event);
    }
}

/// Give stray notifications a chance to arrive, then return them.
pub async fn late_events(rx: &mut UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count(events: &[QueueEvent], name: &str) -> usize {
    events.iter().filter(|e| e.event_name() == name).count()
}

/// Poll until `condition` holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Deterministic pseudo-random delays for completion-order tests.
pub fn scrambled_delays(count: usize, seed: u64) -> Vec<Duration> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            Duration::from_millis((state >> 33) % 15)
        })
        .collect()
}

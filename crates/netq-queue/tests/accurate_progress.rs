//! Accurate-progress mode: size probes run before any download.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{Gauge, MockProbe, MockTransfer, RecordingSink, observe, wait_for_summary};
use netq_queue::{NetworkQueue, OperationRole, QueueConfig, QueueState};

fn accurate_queue() -> Arc<NetworkQueue> {
    NetworkQueue::with_config(QueueConfig::new().with_accurate_progress(true))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_fraction_reflects_probed_total() {
    let queue = accurate_queue();
    let sink = Arc::new(RecordingSink::default());
    queue.set_download_progress_sink(&sink);
    let mut events = observe(&queue);

    for size in [10_u64, 20, 30] {
        // One byte per chunk so the first emission is 1/total whichever
        // transfer moves first. The transfers also report their own totals,
        // which must be ignored once a probe has sized them.
        let transfer = MockTransfer::download(&format!("GET /{size}"), size)
            .chunks(size)
            .probed(MockProbe::sized(size).delay(Duration::from_millis(10)));
        queue.enqueue(Arc::new(transfer)).unwrap();
    }

    queue.go();
    assert_eq!(queue.state(), QueueState::Sizing);

    let (_, summary) = wait_for_summary(&mut events).await;
    assert_eq!(summary.download_total, 60);
    assert_eq!(summary.downloaded_bytes, 60);
    assert_eq!(summary.finished, 3);
    assert_eq!(summary.items.len(), 3);

    let fractions = sink.downloads();
    let first = fractions.first().copied().unwrap();
    assert!((first - 1.0 / 60.0).abs() < 1e-9, "first fraction was {first}");
    assert!((fractions.last().copied().unwrap() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_wait_for_every_probe() {
    let queue = accurate_queue();
    let gauge = Arc::new(Gauge::default());
    let mut events = observe(&queue);

    for (index, delay) in [5_u64, 30, 15].into_iter().enumerate() {
        let probe = MockProbe::sized(8)
            .delay(Duration::from_millis(delay))
            .gauge(gauge.clone());
        let transfer = MockTransfer::download(&format!("GET /p{index}"), 8)
            .probed(probe)
            .gauge(gauge.clone(), 3);
        queue.enqueue(Arc::new(transfer)).unwrap();
    }

    queue.go();
    let (_, summary) = wait_for_summary(&mut events).await;

    assert!(summary.is_success());
    assert_eq!(gauge.probes_done.load(Ordering::SeqCst), 3);
    assert!(!gauge.ordering_violated.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probe_failure_falls_back_to_reported_total() {
    let queue = accurate_queue();
    let mut events = observe(&queue);

    let transfer = MockTransfer::download("GET /no-head", 42)
        .chunks(3)
        .probed(MockProbe::failing());
    queue.enqueue(Arc::new(transfer)).unwrap();

    queue.go();
    let (seen, summary) = wait_for_summary(&mut events).await;

    assert!(summary.is_success());
    assert!(!summary.cancelled_on_failure);
    assert_eq!(summary.download_total, 42);
    assert_eq!(summary.downloaded_bytes, 42);
    assert_eq!(common::count(&seen, "queue:request_failed"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probes_are_not_requests() {
    let queue = accurate_queue();
    let mut events = observe(&queue);

    for i in 0..3 {
        let transfer = MockTransfer::download(&format!("GET /c{i}"), 4).probed(MockProbe::sized(4));
        queue.enqueue(Arc::new(transfer)).unwrap();
    }
    // Declared sizes and uploads never get a probe.
    queue
        .enqueue(Arc::new(MockTransfer::download("GET /known", 4).declared()))
        .unwrap();
    queue
        .enqueue(Arc::new(MockTransfer::upload("PUT /u", 4)))
        .unwrap();

    assert_eq!(queue.requests_count(), 5);
    let snapshot = queue.snapshot();
    assert_eq!(snapshot.operations.len(), 8);
    assert_eq!(
        snapshot
            .operations
            .iter()
            .filter(|op| op.role == OperationRole::Probe)
            .count(),
        3
    );

    queue.go();
    let (seen, summary) = wait_for_summary(&mut events).await;

    assert_eq!(summary.total(), 5);
    assert_eq!(summary.download_total, 16);
    assert_eq!(common::count(&seen, "queue:request_started"), 5);
    assert_eq!(queue.requests_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabling_before_go_drops_probes() {
    let queue = accurate_queue();
    let mut events = observe(&queue);

    let transfer = MockTransfer::download("GET /late", 12).probed(MockProbe::sized(999));
    queue.enqueue(Arc::new(transfer)).unwrap();
    queue.set_accurate_progress(false);

    queue.go();
    assert_ne!(queue.state(), QueueState::Sizing);
    let (_, summary) = wait_for_summary(&mut events).await;

    assert_eq!(summary.download_total, 12);
    assert!(queue.snapshot().operations.iter().all(|op| op.role == OperationRole::Transfer));
}

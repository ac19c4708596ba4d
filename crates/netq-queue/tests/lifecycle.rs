//! Run lifecycle: go, drain, reset and the observer contract.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    Gauge, MockTransfer, RecordingSink, count, eventually, late_events, observe, wait_for_summary,
};
use netq_queue::{NetworkQueue, QueueConfig, QueueError, QueueEvent, QueueState};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_queue_drains_immediately() {
    let queue = NetworkQueue::new();
    let mut events = observe(&queue);

    queue.go();
    let (_, summary) = wait_for_summary(&mut events).await;

    assert_eq!(queue.state(), QueueState::Drained);
    assert_eq!(queue.active_count(), 0);
    assert_eq!(summary.total(), 0);
    assert!(summary.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn go_twice_is_idempotent() {
    let queue = NetworkQueue::new();
    let mut events = observe(&queue);

    let transfers: Vec<Arc<MockTransfer>> = (0..3)
        .map(|i| {
            Arc::new(MockTransfer::download(&format!("GET /{i}"), 5).delay(Duration::from_millis(10)))
        })
        .collect();
    for transfer in &transfers {
        queue.enqueue(transfer.clone()).unwrap();
    }

    queue.go();
    queue.go();
    let (mut seen, summary) = wait_for_summary(&mut events).await;
    queue.go();
    seen.extend(late_events(&mut events).await);

    assert_eq!(summary.finished, 3);
    assert_eq!(count(&seen, "queue:finished"), 1);
    assert_eq!(count(&seen, "queue:request_started"), 3);
    assert!(transfers.iter().all(|t| t.runs.load(Ordering::SeqCst) == 1));
    assert_eq!(queue.state(), QueueState::Drained);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enqueue_after_go_is_rejected() {
    let queue = NetworkQueue::new();
    queue
        .enqueue(Arc::new(MockTransfer::download("GET /a", 1).hanging()))
        .unwrap();
    queue.go();

    let err = queue
        .enqueue(Arc::new(MockTransfer::download("GET /b", 1)))
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidState {
            state: QueueState::Running,
            ..
        }
    ));
    assert_eq!(err.to_string(), "Cannot enqueue while the queue is running");

    queue.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_mid_flight_cancels_everything() {
    let queue = NetworkQueue::new();
    let sink = Arc::new(RecordingSink::default());
    queue.set_download_progress_sink(&sink);
    let mut events = observe(&queue);

    let transfers: Vec<Arc<MockTransfer>> = (0..5)
        .map(|i| Arc::new(MockTransfer::download(&format!("GET /big-{i}"), 1_000).hanging()))
        .collect();
    for transfer in &transfers {
        queue.enqueue(transfer.clone()).unwrap();
    }

    queue.go();
    assert!(eventually(|| queue.progress().totals().download_total == 5_000).await);
    assert!(transfers.iter().all(|t| t.has_started()));

    queue.reset();

    assert!(transfers.iter().all(|t| t.was_cancelled()));
    assert_eq!(queue.state(), QueueState::Suspended);
    assert_eq!(queue.active_count(), 0);
    assert_eq!(queue.requests_count(), 0);
    let snapshot = queue.snapshot();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.download_total, 0);
    assert_eq!(snapshot.downloaded_so_far, 0);
    assert!(queue.download_progress().abs() < f64::EPSILON);

    // The abandoned run never reports completion.
    let stray = late_events(&mut events).await;
    assert_eq!(count(&stray, "queue:finished"), 0);

    let mut events = observe(&queue);
    queue.go();
    let (_, summary) = wait_for_summary(&mut events).await;
    assert_eq!(queue.state(), QueueState::Drained);
    assert_eq!(queue.active_count(), 0);
    assert_eq!(summary.total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_after_drain_allows_a_new_run() {
    let queue = NetworkQueue::with_config(QueueConfig::new().with_max_concurrent(2));
    let mut events = observe(&queue);
    queue
        .enqueue(Arc::new(MockTransfer::download("GET /one", 3)))
        .unwrap();
    queue.go();
    wait_for_summary(&mut events).await;

    queue.reset();
    assert_eq!(queue.state(), QueueState::Suspended);
    assert_eq!(queue.config().max_concurrent.map(|n| n.get()), Some(2));

    let mut events = observe(&queue);
    queue
        .enqueue(Arc::new(MockTransfer::download("GET /two", 4)))
        .unwrap();
    queue.go();
    let (_, summary) = wait_for_summary(&mut events).await;

    assert_eq!(summary.finished, 1);
    assert_eq!(summary.downloaded_bytes, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observers_see_per_transfer_events_in_order() {
    let queue = NetworkQueue::new();
    let mut events = observe(&queue);
    let id = queue
        .enqueue(Arc::new(MockTransfer::download("GET /ordered", 9).chunks(3)))
        .unwrap();

    queue.go();
    let (seen, _) = wait_for_summary(&mut events).await;

    let names: Vec<&str> = seen.iter().map(QueueEvent::event_name).collect();
    assert_eq!(
        names,
        vec![
            "queue:request_started",
            "queue:response_headers",
            "queue:request_finished",
            "queue:finished",
        ]
    );
    assert!(seen[..3].iter().all(|event| event.id() == Some(id)));
    assert!(matches!(
        seen[1],
        QueueEvent::ResponseHeaders {
            status: 200,
            content_length: Some(9),
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn max_concurrent_limits_running_transfers() {
    let queue = NetworkQueue::with_config(QueueConfig::new().with_max_concurrent(2));
    let gauge = Arc::new(Gauge::default());
    let mut events = observe(&queue);

    for i in 0..6 {
        let transfer = MockTransfer::download(&format!("GET /slot-{i}"), 4)
            .chunks(2)
            .delay(Duration::from_millis(10))
            .gauge(gauge.clone(), 0);
        queue.enqueue(Arc::new(transfer)).unwrap();
    }

    queue.go();
    let (_, summary) = wait_for_summary(&mut events).await;

    assert_eq!(summary.finished, 6);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn user_info_is_echoed_in_summary() {
    let queue = NetworkQueue::new();
    queue.set_user_info(Some(serde_json::json!({ "batch": "nightly" })));
    let mut events = observe(&queue);
    queue
        .enqueue(Arc::new(MockTransfer::upload("POST /report", 2)))
        .unwrap();

    queue.go();
    let (_, summary) = wait_for_summary(&mut events).await;

    assert_eq!(
        summary.user_info,
        Some(serde_json::json!({ "batch": "nightly" }))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observer_can_reset_from_completion() {
    use netq_queue::{QueueFinished, QueueObservers, QueueRunSummary};

    struct ResetOnFinish(tokio::sync::mpsc::UnboundedSender<QueueState>);

    impl QueueFinished for ResetOnFinish {
        fn queue_finished(&self, queue: &NetworkQueue, _summary: &QueueRunSummary) {
            queue.reset();
            let _ = self.0.send(queue.state());
        }
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let queue = NetworkQueue::new();
    queue.set_observers(QueueObservers::new().with_queue_finished(Arc::new(ResetOnFinish(tx))));
    queue
        .enqueue(Arc::new(MockTransfer::download("GET /z", 1)))
        .unwrap();
    queue.go();

    let state = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(state, Some(QueueState::Suspended));
}

//! Transaction status reporting: retry, locking and ordered replay.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use docp_common::{AgentConfig, EventType};
use docp_manager::application::services::notifier::{
    Delivery, Phases, Transaction, TransactionNotifier,
};
use docp_manager::domain::TransportError;

use crate::mocks::{FakeAuth, FakeSource, MemoryConfig};

const PHASES: Phases = Phases {
    received: "op_received",
    processing: "op_processing",
    completed: "op_completed",
    error: "op_error",
};

fn notifier(source: &Arc<FakeSource>, auth: &Arc<FakeAuth>) -> TransactionNotifier {
    TransactionNotifier::new(
        source.clone(),
        auth.clone(),
        Arc::new(MemoryConfig::with_token()),
    )
    .with_phase_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_report_skipped_without_token() {
    let source = Arc::new(FakeSource::new());
    let n = TransactionNotifier::new(
        source.clone(),
        Arc::new(FakeAuth::default()),
        Arc::new(MemoryConfig::new(AgentConfig::default())),
    )
    .with_phase_delay(Duration::ZERO);

    let delivery = n
        .notify(&Transaction::begin(), "p", EventType::Open, "m")
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Skipped);
    assert_eq!(source.post_count(), 0);
}

#[tokio::test]
async fn test_forbidden_reauthenticates_and_retries_once() {
    let source = Arc::new(FakeSource::posting([403, 200]));
    let auth = Arc::new(FakeAuth::default());
    let n = notifier(&source, &auth);

    let tx = Transaction::begin();
    let delivery = n.notify(&tx, "p", EventType::Open, "m").await.unwrap();

    assert_eq!(delivery, Delivery::Retried);
    assert_eq!(auth.count(), 1);
    let posted = source.posted.lock().unwrap();
    assert_eq!(posted.len(), 2);
    assert_eq!(posted[0].0.ulid_event, posted[1].0.ulid_event, "same report retried");
}

#[tokio::test]
async fn test_forbidden_with_failed_refresh_is_an_error() {
    let source = Arc::new(FakeSource::posting([403]));
    let auth = Arc::new(FakeAuth {
        fail: true,
        ..FakeAuth::default()
    });
    let n = notifier(&source, &auth);

    assert!(
        n.notify(&Transaction::begin(), "p", EventType::Open, "m")
            .await
            .is_err()
    );
    assert_eq!(source.post_count(), 1);
}

#[tokio::test]
async fn test_server_error_locks_and_queues_in_order() {
    let source = Arc::new(FakeSource::posting([503]));
    let n = notifier(&source, &Arc::new(FakeAuth::default()));
    let tx = Transaction::begin();

    assert_eq!(
        n.notify(&tx, "first", EventType::Open, "m").await.unwrap(),
        Delivery::Queued
    );
    assert!(n.is_locked().await);
    assert_eq!(
        n.notify(&tx, "second", EventType::Update, "m").await.unwrap(),
        Delivery::Queued
    );
    assert_eq!(
        n.notify(&tx, "third", EventType::Close, "m").await.unwrap(),
        Delivery::Queued
    );
    assert_eq!(source.post_count(), 1, "locked reports are not posted");
    assert_eq!(n.pending_len().await, 3);
}

#[tokio::test]
async fn test_flush_replays_fifo_and_unlocks() {
    // first post fails, everything after succeeds
    let source = Arc::new(FakeSource::posting([500, 200]));
    let n = notifier(&source, &Arc::new(FakeAuth::default()));
    let tx = Transaction::begin();
    for phase in ["a", "b", "c"] {
        n.notify(&tx, phase, EventType::Update, "m").await.unwrap();
    }

    assert_eq!(n.flush_pending().await.unwrap(), 3);
    assert!(!n.is_locked().await);
    assert_eq!(n.pending_len().await, 0);
    assert_eq!(source.accepted_phases(), vec!["a", "b", "c"]);

    assert_eq!(
        n.notify(&tx, "d", EventType::Close, "m").await.unwrap(),
        Delivery::Sent
    );
}

#[tokio::test]
async fn test_flush_stops_at_server_error_keeping_head() {
    let source = Arc::new(FakeSource::posting([500, 500, 200, 502]));
    let n = notifier(&source, &Arc::new(FakeAuth::default()));
    let tx = Transaction::begin();
    n.notify(&tx, "a", EventType::Open, "m").await.unwrap();
    n.notify(&tx, "b", EventType::Close, "m").await.unwrap();

    // a: 500 (queued), flush: a -> 500 again
    assert_eq!(n.flush_pending().await.unwrap(), 0);
    assert!(n.is_locked().await);
    assert_eq!(n.pending_len().await, 2);

    // a -> 200, b -> 502
    assert_eq!(n.flush_pending().await.unwrap(), 1);
    assert_eq!(n.pending_len().await, 1);
    assert!(n.is_locked().await);
}

#[tokio::test]
async fn test_flush_drops_report_rejected_after_refresh() {
    // first post fails with 500, every later one is forbidden
    let source = Arc::new(FakeSource::posting([500, 403]));
    let auth = Arc::new(FakeAuth::default());
    let n = notifier(&source, &auth);
    let tx = Transaction::begin();
    n.notify(&tx, "a", EventType::Open, "m").await.unwrap();
    n.notify(&tx, "b", EventType::Close, "m").await.unwrap();

    assert_eq!(n.flush_pending().await.unwrap(), 0);

    assert!(!n.is_locked().await);
    assert_eq!(n.pending_len().await, 0);
    assert_eq!(auth.count(), 2, "one refresh per queued report");
    // 1 original + (post, retry) for each queued report
    assert_eq!(source.post_count(), 5);

    // reports flow again once unlocked
    n.notify(&tx, "c", EventType::Update, "m").await.unwrap();
    assert_eq!(source.post_count(), 7);
    assert_eq!(n.pending_len().await, 0);
}

#[tokio::test]
async fn test_flush_keeps_report_when_retry_hits_server_error() {
    let source = Arc::new(FakeSource::posting([500, 403, 503]));
    let auth = Arc::new(FakeAuth::default());
    let n = notifier(&source, &auth);
    n.notify(&Transaction::begin(), "a", EventType::Open, "m")
        .await
        .unwrap();

    assert_eq!(n.flush_pending().await.unwrap(), 0);

    assert!(n.is_locked().await);
    assert_eq!(n.pending_len().await, 1);
    assert_eq!(auth.count(), 1);
}

#[tokio::test]
async fn test_flush_when_unlocked_is_noop() {
    let source = Arc::new(FakeSource::new());
    let n = notifier(&source, &Arc::new(FakeAuth::default()));
    assert_eq!(n.flush_pending().await.unwrap(), 0);
    assert_eq!(source.post_count(), 0);
}

#[tokio::test]
async fn test_unexpected_status_is_typed_error() {
    let source = Arc::new(FakeSource::posting([422]));
    let n = notifier(&source, &Arc::new(FakeAuth::default()));

    let err = n
        .notify(&Transaction::begin(), "p", EventType::Open, "m")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TransportError>(),
        Some(TransportError::UnexpectedStatus { status: 422, .. })
    ));
    assert!(!n.is_locked().await);
}

#[tokio::test]
async fn test_bracket_reports_open_processing_completed() {
    let source = Arc::new(FakeSource::new());
    let n = notifier(&source, &Arc::new(FakeAuth::default()));

    let value = n
        .bracket(&PHASES, "work", async { anyhow::Ok(7) })
        .await
        .unwrap();

    assert_eq!(value, 7);
    let posted = source.posted.lock().unwrap();
    let phases: Vec<&str> = posted.iter().map(|(s, _)| s.status.as_str()).collect();
    assert_eq!(phases, vec!["op_received", "op_processing", "op_completed"]);
    let events: Vec<EventType> = posted.iter().map(|(s, _)| s.event).collect();
    assert_eq!(events, vec![EventType::Open, EventType::Update, EventType::Close]);
    assert!(posted.iter().all(|(s, _)| s.id == posted[0].0.id));
}

#[tokio::test]
async fn test_each_report_gets_its_own_event_ulid() {
    let source = Arc::new(FakeSource::new());
    let n = notifier(&source, &Arc::new(FakeAuth::default()));
    let tx = Transaction::begin();

    n.notify(&tx, "a", EventType::Open, "m").await.unwrap();
    n.notify(&tx, "b", EventType::Close, "m").await.unwrap();

    let posted = source.posted.lock().unwrap();
    let events: Vec<ulid::Ulid> = posted
        .iter()
        .map(|(s, _)| ulid::Ulid::from_string(&s.ulid_event).expect("event id is a ULID"))
        .collect();
    assert_ne!(events[0], events[1]);
    assert!(events[0].timestamp_ms() <= events[1].timestamp_ms());
    assert_eq!(posted[0].0.id, posted[1].0.id);
}

#[tokio::test]
async fn test_bracket_closes_with_error_text() {
    let source = Arc::new(FakeSource::new());
    let n = notifier(&source, &Arc::new(FakeAuth::default()));

    let result: anyhow::Result<()> = n
        .bracket(&PHASES, "work", async { anyhow::bail!("disk full") })
        .await;

    assert!(result.is_err());
    let posted = source.posted.lock().unwrap();
    let last = &posted.last().unwrap().0;
    assert_eq!(last.status, "op_error");
    assert_eq!(last.message, "disk full");
}

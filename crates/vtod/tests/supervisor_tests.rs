//! Supervisor reconnect and notification timing, on tokio's paused clock.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use common::{call_event, device, entries, unlock_event, Op, Script, ScriptedClient};
use vto_core::{Field, ProtocolEvent};
use vtod::notify::MemoryNotifier;
use vtod::supervisor::{BackoffPolicy, ConnectionState, Supervisor, SupervisorHandle};

// ============================================================================
// Test Helpers
// ============================================================================

fn spawn(scripts: Vec<Script>) -> (SupervisorHandle, common::ClientLog, Arc<MemoryNotifier>) {
    let (client, log) = ScriptedClient::new(scripts);
    let sink = Arc::new(MemoryNotifier::new());
    let handle = Supervisor::spawn(
        Arc::new(device("door")),
        client,
        sink.clone(),
        BackoffPolicy::default(),
    );
    (handle, log, sink)
}

async fn wait_connected(handle: &SupervisorHandle) {
    let mut state = handle.watch_state();
    state
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .expect("supervisor should connect");
}

fn values(sink: &MemoryNotifier) -> Vec<(Field, u8)> {
    sink.snapshot().iter().map(|n| (n.field, n.value)).collect()
}

// ============================================================================
// Reconnect Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_error_waits_30s_before_retry() {
    let (handle, log, _) = spawn(vec![Script::Fail]);
    wait_connected(&handle).await;

    let opens = entries(&log, "door", Op::Open);
    assert_eq!(opens.len(), 2);
    let waited = opens[1].at - opens[0].at;
    assert!(waited >= Duration::from_secs(30), "waited {waited:?}");
    assert!(waited < Duration::from_secs(31), "waited {waited:?}");
    assert_eq!(handle.state().attempts, 2);

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_clean_disconnect_waits_5s_before_retry() {
    let (handle, log, _) = spawn(vec![Script::CloseAfter(Vec::new())]);

    // The first session ends immediately; the second one holds.
    let mut state = handle.watch_state();
    state.wait_for(|s| s.attempts == 2).await.unwrap();
    wait_connected(&handle).await;

    let opens = entries(&log, "door", Op::Open);
    assert_eq!(opens.len(), 2);
    let waited = opens[1].at - opens[0].at;
    assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
    assert!(waited < Duration::from_secs(6), "waited {waited:?}");

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_session_error_waits_30s_before_retry() {
    let (handle, log, sink) = spawn(vec![Script::FailAfter(vec![unlock_event()])]);

    let mut state = handle.watch_state();
    let snapshot = state
        .wait_for(|s| matches!(s.state, ConnectionState::Failed { .. }))
        .await
        .unwrap()
        .clone();
    match snapshot.state {
        ConnectionState::Failed { retry_in, reason } => {
            assert_eq!(retry_in, Duration::from_secs(30));
            assert!(reason.contains("scripted session error"));
        }
        other => panic!("unexpected state {other:?}"),
    }

    state.wait_for(|s| s.attempts == 2).await.unwrap();
    wait_connected(&handle).await;

    // The failed session was closed before the retry
    assert_eq!(entries(&log, "door", Op::Close).len(), 1);
    let opens = entries(&log, "door", Op::Open);
    assert_eq!(opens.len(), 2);
    let waited = opens[1].at - opens[0].at;
    assert!(waited >= Duration::from_secs(30), "waited {waited:?}");
    assert!(waited < Duration::from_secs(31), "waited {waited:?}");

    // Events delivered before the failure were still handled
    assert_eq!(values(&sink)[0], (Field::Unlocked, 1));

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_retries_forever() {
    let (handle, log, _) = spawn(vec![Script::Fail; 10]);
    wait_connected(&handle).await;

    assert_eq!(entries(&log, "door", Op::Open).len(), 11);
    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_state_is_published() {
    let (handle, _, _) = spawn(vec![Script::Fail]);

    let mut state = handle.watch_state();
    let snapshot = state
        .wait_for(|s| matches!(s.state, ConnectionState::Failed { .. }))
        .await
        .unwrap()
        .clone();

    match snapshot.state {
        ConnectionState::Failed { retry_in, reason } => {
            assert_eq!(retry_in, Duration::from_secs(30));
            assert!(reason.contains("scripted failure"));
        }
        other => panic!("unexpected state {other:?}"),
    }
    handle.shutdown(Duration::from_secs(5)).await;
}

// ============================================================================
// Stop Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_unblocks_live_connection() {
    let (handle, log, _) = spawn(Vec::new());
    wait_connected(&handle).await;

    let mut state = handle.watch_state();
    assert!(handle.shutdown(Duration::from_secs(5)).await);

    assert_eq!(entries(&log, "door", Op::Close).len(), 1);
    assert_eq!(state.borrow_and_update().state, ConnectionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_exits_without_sleeping() {
    let (handle, log, _) = spawn(vec![Script::Fail]);

    let mut state = handle.watch_state();
    state
        .wait_for(|s| matches!(s.state, ConnectionState::Failed { .. }))
        .await
        .unwrap();

    let started = Instant::now();
    assert!(handle.shutdown(Duration::from_secs(5)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(entries(&log, "door", Op::Open).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_session_error_exits_without_retry() {
    let (handle, log, sink) = spawn(vec![Script::FailAfter(vec![call_event()])]);

    let mut state = handle.watch_state();
    state
        .wait_for(|s| matches!(s.state, ConnectionState::Failed { .. }))
        .await
        .unwrap();

    let started = Instant::now();
    assert!(handle.shutdown(Duration::from_secs(5)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(entries(&log, "door", Op::Open).len(), 1);
    assert_eq!(entries(&log, "door", Op::Close).len(), 1);
    assert_eq!(state.borrow_and_update().state, ConnectionState::Stopped);

    // The call revert still pending at stop is flushed
    assert_eq!(values(&sink), vec![(Field::Calling, 1), (Field::Calling, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let (handle, _, _) = spawn(Vec::new());
    wait_connected(&handle).await;

    handle.stop();
    handle.stop();
    assert!(handle.is_stopped());
    assert!(handle.shutdown(Duration::from_secs(5)).await);
}

// ============================================================================
// Notification Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_call_sets_calling_then_reverts_after_30s() {
    let (handle, _, sink) = spawn(vec![Script::Hold(vec![call_event()])]);
    wait_connected(&handle).await;

    sleep(Duration::from_secs(1)).await;
    assert_eq!(values(&sink), vec![(Field::Calling, 1)]);

    sleep(Duration::from_secs(28)).await;
    assert_eq!(values(&sink), vec![(Field::Calling, 1)]);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(values(&sink), vec![(Field::Calling, 1), (Field::Calling, 0)]);

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_access_sets_unlocked_then_reverts_after_10s() {
    let (handle, _, sink) = spawn(vec![Script::Hold(vec![unlock_event()])]);
    wait_connected(&handle).await;

    sleep(Duration::from_secs(9)).await;
    assert_eq!(values(&sink), vec![(Field::Unlocked, 1)]);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(values(&sink), vec![(Field::Unlocked, 1), (Field::Unlocked, 0)]);

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_other_events_are_ignored() {
    let events = vec![
        ProtocolEvent::new("Stop", "CallNoAnswered"),
        ProtocolEvent::new("Pulse", "VideoMotion"),
    ];
    let (handle, _, sink) = spawn(vec![Script::Hold(events)]);
    wait_connected(&handle).await;

    sleep(Duration::from_secs(60)).await;
    assert!(sink.is_empty());

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_events_survive_reconnect() {
    let scripts = vec![
        Script::CloseAfter(vec![unlock_event()]),
        Script::Hold(vec![call_event()]),
    ];
    let (handle, _, sink) = spawn(scripts);

    // Unlock at t=0, reconnect at t=5, call at t=5
    sleep(Duration::from_secs(6)).await;
    assert_eq!(values(&sink), vec![(Field::Unlocked, 1), (Field::Calling, 1)]);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(
        values(&sink),
        vec![(Field::Unlocked, 1), (Field::Calling, 1), (Field::Unlocked, 0)]
    );

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_flushes_pending_revert() {
    let (handle, _, sink) = spawn(vec![Script::Hold(vec![call_event()])]);
    wait_connected(&handle).await;
    sleep(Duration::from_secs(1)).await;

    assert!(handle.shutdown(Duration::from_secs(5)).await);
    assert_eq!(values(&sink), vec![(Field::Calling, 1), (Field::Calling, 0)]);

    // Nothing more once the supervisor has stopped
    sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.len(), 2);
}

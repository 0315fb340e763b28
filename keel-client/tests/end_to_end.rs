//! End-to-end flows over mock transport and file storage: go offline,
//! accumulate operations, reconnect, and watch the queue drain.

use keel_client::supervisor::{RecoveryState, RecoverySupervisor, SupervisorConfig};
use keel_client::{Keel, KeelConfig, MockTransport, OperationOutcome};
use keel_client::storage::FileStorage;
use keel_core::classify::RawFailure;
use keel_core::MonitorConfig;
use keel_types::{ConnectionStatus, ErrorKind, QueueItem, RetryPolicy};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("keel_client=debug,keel_core=debug")
        .with_test_writer()
        .try_init();
}

fn fast_cfg() -> KeelConfig {
    let policy = RetryPolicy::default()
        .with_max_attempts(3)
        .with_base_delay(Duration::from_millis(1))
        .with_jitter(false);
    KeelConfig {
        monitor: MonitorConfig {
            max_reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_millis(1),
            jitter: false,
        },
        retry: policy,
        replay: policy,
        reporter: None,
    }
}

async fn wait_until_empty(keel: &Keel<MockTransport, FileStorage>) {
    for _ in 0..100 {
        if keel.pending().await.unwrap() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("queue never drained");
}

#[tokio::test]
async fn offline_operations_survive_restart_and_replay_on_reconnect() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();

    // Session one: offline, operations pile up durably.
    {
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let keel = Keel::init(Arc::new(transport.clone()), storage, fast_cfg())
            .await
            .unwrap();

        for n in 0..3 {
            let outcome = keel
                .submit(QueueItem::new("send_message", json!({ "n": n })))
                .await
                .unwrap();
            assert!(matches!(outcome, OperationOutcome::Queued(_)));
        }
        assert_eq!(keel.pending().await.unwrap(), 3);
        keel.close().await;
    }

    // Session two: fresh context over the same directory, connectivity back.
    let storage = FileStorage::open(dir.path()).await.unwrap();
    let keel = Keel::init(Arc::new(transport.clone()), storage, fast_cfg())
        .await
        .unwrap();
    assert_eq!(keel.pending().await.unwrap(), 3);

    let replayed = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&replayed);
    keel.coordinator()
        .register("send_message", move |_item| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    keel.connect().await.unwrap();
    wait_until_empty(&keel).await;
    assert_eq!(replayed.load(Ordering::SeqCst), 3);
    keel.close().await;
}

#[tokio::test]
async fn flaky_link_recovers_and_drains() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let storage = FileStorage::open(dir.path()).await.unwrap();
    let keel = Keel::init(Arc::new(transport.clone()), storage, fast_cfg())
        .await
        .unwrap();
    keel.coordinator()
        .register("send_message", |_item| async { Ok(()) })
        .await;

    keel.connect().await.unwrap();
    assert_eq!(
        keel.connection_info().await.status,
        ConnectionStatus::Connected
    );

    // Link drops; the next two reconnect attempts fail before one lands.
    transport.drop_connection();
    transport.fail_connects(2, "connection reset");
    keel.submit(QueueItem::new("send_message", json!({ "while": "down" })))
        .await
        .unwrap();

    keel.notify_offline("socket closed").await.unwrap();
    assert_eq!(
        keel.connection_info().await.status,
        ConnectionStatus::Connected
    );
    wait_until_empty(&keel).await;
    keel.close().await;
}

#[tokio::test]
async fn reconnect_exhaustion_surfaces_and_explicit_retry_recovers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let storage = FileStorage::open(dir.path()).await.unwrap();
    let keel = Keel::init(Arc::new(transport.clone()), storage, fast_cfg())
        .await
        .unwrap();

    transport.fail_connects(10, "network unreachable");
    let err = keel.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionLost);

    let info = keel.connection_info().await;
    assert_eq!(info.status, ConnectionStatus::Disconnected);
    assert_eq!(info.reconnect_attempts, 3);

    // Outage over; an explicit caller action starts a fresh budget.
    transport.reset();
    keel.connect().await.unwrap();
    assert_eq!(
        keel.connection_info().await.status,
        ConnectionStatus::Connected
    );
    keel.close().await;
}

#[tokio::test]
async fn stale_asset_failure_reloads_unless_recovered_first() {
    init_tracing();
    let reloads = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&reloads);
    let supervisor = RecoverySupervisor::new(
        SupervisorConfig {
            reload_delay: Duration::from_millis(20),
        },
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    // First failure recovers in time: no reload.
    supervisor.absorb(Some(&RawFailure::message(
        "Failed to fetch dynamically imported module: /assets/chunk-a1b2.js",
    )));
    assert!(matches!(supervisor.state(), RecoveryState::Updating { .. }));
    supervisor.reset();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(reloads.load(Ordering::SeqCst), 0);

    // Second failure is not recovered: the delayed reload fires once.
    supervisor.absorb(Some(&RawFailure::message("Loading chunk 42 failed")));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(reloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_hundred_concurrent_classifications_all_resolve() {
    init_tracing();
    let transport = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).await.unwrap();
    let keel = Keel::init(Arc::new(transport), storage, fast_cfg())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..100 {
        let keel = Arc::clone(&keel);
        handles.push(tokio::spawn(async move {
            let message = format!("network error #{n} \u{1F30A}");
            keel.handle_error(Some(&RawFailure::message(&message))).await
        }));
    }

    for handle in handles {
        let record = handle.await.unwrap();
        assert_eq!(record.kind, ErrorKind::Network);
        assert!(record.timestamp_ms > 0);
    }
}

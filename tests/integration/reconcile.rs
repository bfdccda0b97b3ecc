use std::time::{Duration, Instant};

use beacon_core::StatusCode;
use beacon_services::lock_monitor;

use crate::*;

/// Empty registry + three new endpoints → three Pending monitors with
/// connects staggered 1s/2s/3s.
#[tokio::test]
async fn test_new_batch_is_staggered() {
    let h = Harness::new(10);
    let now = Instant::now();
    let batch = [
        record("10.1.0.1", 27017),
        record("10.1.0.2", 27017),
        record("10.1.0.3", 27017),
    ];

    let summary = h.reconciler().reconcile(&batch, now);
    assert_eq!(summary.added, 3);

    for (i, r) in batch.iter().enumerate() {
        let handle = h.monitor(r);
        let m = lock_monitor(&handle);
        assert_eq!(
            m.state().next_connect_at,
            Some(now + Duration::from_secs(i as u64 + 1))
        );
    }

    let stored = h.stored().await;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|s| s.status == StatusCode::Pending));

    // Only the first is due after one second.
    h.tick_all(now + Duration::from_secs(1));
    assert_eq!(h.sessions.commands(&batch[0]).len(), 1);
    assert!(h.sessions.commands(&batch[1]).is_empty());
}

/// A known, unchanged endpoint is refreshed in place.
#[tokio::test]
async fn test_known_endpoint_keeps_attempts() {
    let h = Harness::new(11);
    let r = record("10.1.1.1", 27017);
    let now = Instant::now();
    h.reconciler().reconcile(&[r.clone()], now);
    h.tick_all(now + Duration::from_secs(1));

    h.reconciler().reconcile(&[r.clone()], now + Duration::from_secs(60));

    assert_eq!(h.ctx.registry.len(), 1);
    assert_eq!(h.sessions.created(), 1);
    assert_eq!(lock_monitor(&h.monitor(&r)).state().reconnect_attempt_count, 1);
}

/// A struggling endpoint listed on a new port moves there, in memory and
/// in the store.
#[tokio::test]
async fn test_migration_to_new_port() {
    let h = Harness::new(12);
    let r = record("10.1.2.1", 27017);
    let now = Instant::now();
    h.reconciler().reconcile(&[r.clone()], now);

    {
        let handle = h.monitor(&r);
        let mut m = lock_monitor(&handle);
        for _ in 0..5 {
            m.schedule_connect(now);
            m.tick(now);
        }
        assert_eq!(m.state().reconnect_attempt_count, 5);
    }

    let moved = record("10.1.2.1", 27040);
    let summary = h.reconciler().reconcile(&[moved.clone()], now);
    assert_eq!(summary.migrated, 1);

    let handle = h.monitor(&r);
    {
        let mut m = lock_monitor(&handle);
        assert_eq!(m.record().port, 27040);
        assert_eq!(m.state().reconnect_attempt_count, 0);
        m.schedule_connect(now);
        m.tick(now);
    }
    assert_eq!(
        h.sessions.commands(&r).last(),
        Some(&Command::Connect("10.1.2.1:27040".into()))
    );

    let stored = h.stored().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.port, 27040);
}

/// Two failed attempts are not enough to follow a port change.
#[tokio::test]
async fn test_no_migration_at_two_attempts() {
    let h = Harness::new(14);
    let r = record("10.1.3.1", 27017);
    let now = Instant::now();
    h.reconciler().reconcile(&[r.clone()], now);

    {
        let handle = h.monitor(&r);
        let mut m = lock_monitor(&handle);
        for _ in 0..2 {
            m.schedule_connect(now);
            m.tick(now);
        }
    }

    let summary = h.reconciler().reconcile(&[record("10.1.3.1", 27040)], now);
    assert_eq!(summary.migrated, 0);
    assert_eq!(lock_monitor(&h.monitor(&r)).record().port, 27017);
    assert_eq!(h.stored().await[0].record.port, 27017);
}

/// Overlapping batches reconciled from several threads still give one
/// monitor per identity.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconcile_single_monitor() {
    let h = Harness::new(13);
    let now = Instant::now();
    let batches: Vec<Vec<_>> = (0..8)
        .map(|offset| {
            (0..20)
                .map(|i| record(&format!("10.2.0.{}", (i + offset) % 24), 27017))
                .collect()
        })
        .collect();

    std::thread::scope(|s| {
        for batch in &batches {
            let reconciler = h.reconciler();
            s.spawn(move || reconciler.reconcile(batch, now));
        }
    });

    assert_eq!(h.ctx.registry.len(), 24);
    assert_eq!(h.sessions.created(), 24);
    let stored = h.stored().await;
    assert_eq!(stored.len(), 24);
}

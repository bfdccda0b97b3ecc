use std::time::{Duration, Instant};

use beacon_core::config::DiscoveryConfig;
use beacon_core::StatusCode;
use beacon_services::{lock_monitor, Phase, Scheduler, SessionEvent, StoredEndpoint};

use crate::*;

const HOUR: Duration = Duration::from_secs(3600);

/// New endpoint → connect → logon → online → drops → retrying, with every
/// transition visible in the store.
#[tokio::test]
async fn test_endpoint_lifecycle() {
    let h = Harness::new(1);
    let r = record("10.0.0.1", 27017);
    let t0 = Instant::now();

    h.reconciler().reconcile(&[r.clone()], t0);
    assert_eq!(h.stored_status(&r).await, Some(StatusCode::Pending));

    h.tick_all(t0 + Duration::from_secs(1));
    assert_eq!(h.sessions.commands(&r), vec![Command::Connect("10.0.0.1:27017".into())]);

    h.sessions.emit(&r, SessionEvent::Connected(StatusCode::Ok));
    h.tick_all(t0 + Duration::from_secs(2));
    assert_eq!(h.sessions.commands(&r).last(), Some(&Command::Logon));
    assert_eq!(lock_monitor(&h.monitor(&r)).phase(), Phase::Authenticating);

    h.sessions.emit(&r, SessionEvent::Authenticated(StatusCode::Ok));
    h.tick_all(t0 + Duration::from_secs(3));
    assert_eq!(lock_monitor(&h.monitor(&r)).phase(), Phase::Online);
    assert_eq!(h.stored_status(&r).await, Some(StatusCode::Ok));

    let t = t0 + Duration::from_secs(100);
    h.sessions.emit(&r, SessionEvent::Disconnected(StatusCode::Timeout));
    h.tick_all(t);
    {
        let handle = h.monitor(&r);
        let m = lock_monitor(&handle);
        assert_eq!(m.phase(), Phase::Retrying);
        assert_eq!(m.state().reconnect_attempt_count, 2);
        let next = m.state().next_connect_at.unwrap();
        assert!(next >= t + Duration::from_secs(10) && next < t + Duration::from_secs(30));
    }
    assert_eq!(h.stored_status(&r).await, Some(StatusCode::Timeout));
}

/// A first failed attempt after a healthy period stays non-alerting.
#[tokio::test]
async fn test_first_retry_is_reconnecting() {
    let h = Harness::new(2);
    let r = record("10.0.0.2", 27017);
    let t0 = Instant::now();
    h.reconciler().reconcile(&[r.clone()], t0);

    h.tick_all(t0 + Duration::from_secs(1));
    h.sessions.emit(&r, SessionEvent::Disconnected(StatusCode::Refused));
    h.tick_all(t0 + Duration::from_secs(2));

    let status = h.stored_status(&r).await.unwrap();
    assert_eq!(status, StatusCode::Reconnecting);
    assert!(!status.is_alerting());
}

/// Unseen and unauthenticated for over a day: removed on the next
/// disconnect, from the registry and the store.
#[tokio::test]
async fn test_stale_endpoint_removed() {
    let h = Harness::new(3);
    let stale = record("10.0.1.1", 27017);
    let fresh = record("10.0.1.2", 27017);
    let t0 = Instant::now();
    h.reconciler().reconcile(&[stale.clone(), fresh.clone()], t0);

    let later = t0 + 25 * HOUR;
    // Discovery still lists `fresh`.
    h.reconciler().reconcile(&[fresh.clone()], later);
    h.tick_all(later);
    h.sessions.emit(&stale, SessionEvent::Disconnected(StatusCode::Timeout));
    h.sessions.emit(&fresh, SessionEvent::Disconnected(StatusCode::Timeout));
    h.tick_all(later + Duration::from_secs(1));

    assert!(!h.ctx.registry.contains(&stale.identity()));
    assert!(h.ctx.registry.contains(&fresh.identity()));

    let stored = h.stored().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.identity(), fresh.identity());
}

/// Shutdown disconnects every monitor, waits for the acks and resets
/// every stored status.
#[tokio::test]
async fn test_shutdown_resets_statuses() {
    let h = Harness::new(4);
    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let scheduler = Scheduler::new(h.ctx.clone(), None, DiscoveryConfig::default(), rx);

    let seed: Vec<StoredEndpoint> = (0..5)
        .map(|i| StoredEndpoint {
            record: record(&format!("10.0.2.{}", i), 27017),
            status: StatusCode::Ok,
        })
        .collect();
    scheduler.seed(&seed, Instant::now());

    let running = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    for s in &seed {
        assert!(h.sessions.commands(&s.record).contains(&Command::Disconnect));
    }
    for handle in h.ctx.registry.snapshot() {
        assert!(lock_monitor(&handle).is_shut_down());
    }
    let stored = h.stored().await;
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|s| s.status == StatusCode::Invalid));
}

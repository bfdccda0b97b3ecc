use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_core::config::{DiscoveryConfig, MonitorConfig};
use beacon_core::{EndpointIdentity, EndpointRecord, Jitter, StatusCode, Transport};
use beacon_services::{
    lock_monitor, MonitorContext, PersistenceStore, Phase, Reconciler, Scheduler, SessionEvent,
    SqliteStore, StatusReporter, StoreError, StoredEndpoint,
};

use crate::*;

fn temp_db(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("beacon-it-{}-{}", name, std::process::id()))
        .join("beacon.db")
}

/// Endpoints persisted by a previous run are monitored again on start.
#[tokio::test]
async fn test_seed_from_previous_run() {
    let path = temp_db("seed");
    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .upsert_status(&record("10.3.0.1", 27017), StatusCode::Ok)
            .unwrap();
        store
            .upsert_status(
                &EndpointRecord::new("cm.example.net", 443, "fra", Transport::WebSocket),
                StatusCode::Timeout,
            )
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let stored = store.load_all().unwrap();
    assert_eq!(stored.len(), 2);

    let h = Harness::with_store(20, store);
    let (_tx, rx) = tokio::sync::broadcast::channel(1);
    let scheduler = Scheduler::new(h.ctx.clone(), None, DiscoveryConfig::default(), rx);
    let summary = scheduler.seed(&stored, Instant::now());

    assert_eq!(summary.added, 2);
    let ws = h
        .ctx
        .registry
        .get(&EndpointIdentity {
            host: "cm.example.net".into(),
            secure: true,
        })
        .unwrap();
    assert_eq!(lock_monitor(&ws).record().locality, "fra");
    assert!(h.stored().await.iter().all(|s| s.status == StatusCode::Pending));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

/// Store that rejects every status write.
#[derive(Default)]
struct BrokenStore {
    writes: AtomicUsize,
}

impl PersistenceStore for BrokenStore {
    fn load_all(&self) -> Result<Vec<StoredEndpoint>, StoreError> {
        Ok(Vec::new())
    }
    fn upsert_status(&self, _: &EndpointRecord, _: StatusCode) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::CreateDir(
            "/nonexistent".into(),
            std::io::Error::other("disk gone"),
        ))
    }
    fn update_address(&self, _: &EndpointIdentity, _: &EndpointRecord) -> Result<(), StoreError> {
        Ok(())
    }
    fn delete_endpoint(&self, _: &EndpointIdentity) -> Result<(), StoreError> {
        Ok(())
    }
    fn reset_all_statuses(&self, _: StatusCode) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Failed writes never stop monitoring; each new status retries.
#[tokio::test]
async fn test_store_failures_are_non_fatal() {
    let store = Arc::new(BrokenStore::default());
    let (reporter, _worker) = StatusReporter::spawn(store.clone());
    let sessions = ScriptedSessions::default();
    let ctx = MonitorContext::new(
        MonitorConfig::default(),
        reporter,
        Jitter::from_seed(21),
        Arc::new(sessions.clone()),
    );

    let r = record("10.3.1.1", 27017);
    let now = Instant::now();
    Reconciler::new(ctx.clone()).reconcile(&[r.clone()], now);

    let handle = ctx.registry.get(&r.identity()).unwrap();
    {
        let mut m = lock_monitor(&handle);
        m.tick(now + Duration::from_secs(1));
        m.handle_event(SessionEvent::Connected(StatusCode::Ok), now);
        m.handle_event(SessionEvent::Authenticated(StatusCode::Ok), now);
        assert_eq!(m.phase(), Phase::Online);
        assert_eq!(m.state().last_reported_status, Some(StatusCode::Ok));
    }

    ctx.reporter.flush().await;
    assert_eq!(store.writes.load(Ordering::SeqCst), 2);
}

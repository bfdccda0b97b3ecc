//! Beacon integration test harness.
//!
//! Scenarios drive the whole engine (registry, monitors, reconciler,
//! reporter, store worker, scheduler) with a scripted session factory and a
//! SQLite store. Nothing leaves the machine; the API tests bind 127.0.0.1.
//!
//!   cargo test --test integration

use std::sync::Arc;
use std::time::Instant;

use beacon_core::config::MonitorConfig;
use beacon_core::{EndpointRecord, Jitter, StatusCode};
use beacon_services::{
    lock_monitor, MonitorContext, MonitorHandle, PersistenceStore, Reconciler, SqliteStore,
    StatusReporter, StoredEndpoint,
};

pub use beacon_services::testing::{record, Command, ScriptedSessions};

mod api;
mod lifecycle;
mod persistence;
mod reconcile;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Engine wired to an in-memory store with a running store worker.
/// Must be built inside a tokio runtime.
pub struct Harness {
    pub ctx: MonitorContext,
    pub sessions: ScriptedSessions,
    pub store: Arc<SqliteStore>,
}

impl Harness {
    pub fn new(seed: u64) -> Self {
        Self::with_store(seed, SqliteStore::open_in_memory().unwrap())
    }

    pub fn with_store(seed: u64, store: SqliteStore) -> Self {
        let store = Arc::new(store);
        let (reporter, _worker) = StatusReporter::spawn(store.clone());
        let sessions = ScriptedSessions::default();
        let ctx = MonitorContext::new(
            MonitorConfig::default(),
            reporter,
            Jitter::from_seed(seed),
            Arc::new(sessions.clone()),
        );
        Self {
            ctx,
            sessions,
            store,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.ctx.clone())
    }

    pub fn monitor(&self, record: &EndpointRecord) -> MonitorHandle {
        self.ctx
            .registry
            .get(&record.identity())
            .expect("endpoint not registered")
    }

    /// Tick every registered monitor at `now`.
    pub fn tick_all(&self, now: Instant) {
        for handle in self.ctx.registry.snapshot() {
            lock_monitor(&handle).tick(now);
        }
    }

    /// Store contents once every queued write has landed.
    pub async fn stored(&self) -> Vec<StoredEndpoint> {
        self.ctx.reporter.flush().await;
        self.store.load_all().unwrap()
    }

    pub async fn stored_status(&self, record: &EndpointRecord) -> Option<StatusCode> {
        self.stored()
            .await
            .into_iter()
            .find(|s| s.record.identity() == record.identity())
            .map(|s| s.status)
    }
}

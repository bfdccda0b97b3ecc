//! Scheduler — drives monitor ticks and discovery refreshes.
//!
//! One loop ticks every monitor on a fixed cadence. Discovery fetches are
//! spawned off the loop so a slow directory never delays a tick. On the
//! shutdown signal the in-flight fetch is cancelled, the registry is closed
//! to new batches, every monitor is asked to disconnect, the loop waits for
//! all acknowledgements, then stored statuses are reset.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use beacon_core::config::DiscoveryConfig;
use beacon_core::{EndpointIdentity, EndpointRecord, StatusCode};

use crate::context::MonitorContext;
use crate::discovery::DiscoverySource;
use crate::reconciler::{ReconcileSummary, Reconciler};
use crate::registry::lock_monitor;
use crate::store::StoredEndpoint;

/// Cycles between registry snapshot log lines.
const SNAPSHOT_EVERY: u64 = 60;

/// Poll interval while waiting for shutdown acknowledgements.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

pub struct Scheduler {
    ctx: MonitorContext,
    reconciler: Reconciler,
    discovery: Option<Arc<dyn DiscoverySource>>,
    config: DiscoveryConfig,
    next_refresh_at: Instant,
    locality: u32,
    refresh_task: Option<JoinHandle<()>>,
    cycles: u64,
    shutdown: broadcast::Receiver<()>,
}

impl Scheduler {
    /// The first discovery refresh is due immediately.
    pub fn new(
        ctx: MonitorContext,
        discovery: Option<Arc<dyn DiscoverySource>>,
        config: DiscoveryConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(ctx.clone()),
            ctx,
            discovery,
            config,
            next_refresh_at: Instant::now(),
            locality: 0,
            refresh_task: None,
            cycles: 0,
            shutdown,
        }
    }

    /// Feed the persisted endpoints in as the first batch.
    pub fn seed(&self, stored: &[StoredEndpoint], now: Instant) -> ReconcileSummary {
        let records: Vec<EndpointRecord> = stored.iter().map(|s| s.record.clone()).collect();
        let summary = self.reconciler.reconcile(&records, now);
        tracing::info!(
            stored = stored.len(),
            monitors = self.ctx.registry.len(),
            "seeded from store"
        );
        summary
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.ctx.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            monitors = self.ctx.registry.len(),
            tick_ms = self.ctx.config.tick_interval().as_millis() as u64,
            discovery = self.discovery.is_some(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("scheduler shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.cycle(Instant::now());
                }
            }
        }

        if let Some(task) = self.refresh_task.take() {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::warn!(error = %e, "discovery refresh panicked");
                }
            }
        }
        stop(&self.ctx).await;
    }

    /// One scheduler cycle: tick every monitor, then start a refresh if due.
    pub fn cycle(&mut self, now: Instant) {
        for handle in self.ctx.registry.snapshot() {
            lock_monitor(&handle).tick(now);
        }

        self.cycles += 1;
        if self.cycles % SNAPSHOT_EVERY == 0 {
            let counts = self.ctx.registry.counts();
            tracing::info!(
                total = counts.total,
                online = counts.online,
                retrying = counts.retrying,
                connecting = counts.connecting + counts.authenticating,
                idle = counts.idle,
                "registry snapshot"
            );
        }

        self.maybe_refresh(now);
    }

    fn maybe_refresh(&mut self, now: Instant) {
        let Some(discovery) = self.discovery.clone() else {
            return;
        };
        if now < self.next_refresh_at {
            return;
        }
        if self.refresh_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        self.next_refresh_at =
            now + self.config.refresh_base() + self.ctx.jitter.between(self.config.refresh_jitter());
        let localities = self.next_localities();
        let reconciler = self.reconciler.clone();

        self.refresh_task = Some(tokio::spawn(async move {
            refresh(discovery.as_ref(), &reconciler, &localities).await;
        }));
    }

    /// Localities for the next refresh: the round-robin id, plus the extra
    /// locality when the id is a multiple of `extra_every`.
    pub fn next_localities(&mut self) -> Vec<u32> {
        let primary = self.locality;
        self.locality = (self.locality + 1) % self.config.locality_count.max(1);

        let mut ids = vec![primary];
        if let Some(extra) = self.config.extra_locality {
            if self.config.extra_every > 0 && primary % self.config.extra_every == 0 && extra != primary {
                ids.push(extra);
            }
        }
        ids
    }
}

/// Fetch `localities` (first is primary) and reconcile the merged batch.
///
/// Returns `None` when the primary fetch failed. A failed secondary fetch
/// only drops its records.
pub async fn refresh(
    discovery: &dyn DiscoverySource,
    reconciler: &Reconciler,
    localities: &[u32],
) -> Option<ReconcileSummary> {
    let (&primary, extras) = localities.split_first()?;

    let mut batch = match discovery.fetch(primary).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, locality = primary, "discovery refresh failed");
            return None;
        }
    };
    tracing::info!(locality = primary, endpoints = batch.len(), "discovery refresh");

    for &extra in extras {
        match discovery.fetch(extra).await {
            Ok(records) => {
                let known: std::collections::HashSet<EndpointIdentity> =
                    batch.iter().map(|r| r.identity()).collect();
                let before = batch.len();
                batch.extend(records.into_iter().filter(|r| !known.contains(&r.identity())));
                tracing::info!(locality = extra, merged = batch.len() - before, "extra locality merged");
            }
            Err(e) => tracing::warn!(error = %e, locality = extra, "extra locality fetch failed"),
        }
    }

    Some(reconciler.reconcile(&batch, Instant::now()))
}

/// Close the registry to discovery, disconnect every monitor, wait for all
/// acknowledgements, reset stored statuses and flush the store queue.
pub async fn stop(ctx: &MonitorContext) {
    ctx.close();
    let monitors = ctx.registry.snapshot();
    tracing::info!(monitors = monitors.len(), "disconnecting all monitors");

    for handle in &monitors {
        lock_monitor(handle).begin_shutdown();
    }

    let mut pending = monitors;
    loop {
        let now = Instant::now();
        pending.retain(|handle| {
            let mut monitor = lock_monitor(handle);
            monitor.drain_events(now);
            !monitor.is_shut_down()
        });
        if pending.is_empty() {
            break;
        }
        tracing::debug!(pending = pending.len(), "waiting for disconnect acknowledgements");
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }

    ctx.reporter.reset_all(StatusCode::Invalid);
    ctx.reporter.flush().await;
    tracing::info!("all monitors disconnected");
}

// ── Full sweep ────────────────────────────────────────────────────────────────

/// Walks every locality once per sweep interval, with a jittered pause
/// between ids, to surface endpoints only listed for some localities.
pub struct SweepLoop {
    discovery: Arc<dyn DiscoverySource>,
    reconciler: Reconciler,
    jitter: beacon_core::Jitter,
    config: DiscoveryConfig,
    shutdown: broadcast::Receiver<()>,
}

impl SweepLoop {
    pub fn new(
        ctx: &MonitorContext,
        discovery: Arc<dyn DiscoverySource>,
        config: DiscoveryConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            discovery,
            reconciler: Reconciler::new(ctx.clone()),
            jitter: ctx.jitter.clone(),
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.sweep_interval());

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("locality sweep shutting down");
                    return;
                }

                _ = interval.tick() => {
                    if !self.sweep().await {
                        return;
                    }
                }
            }
        }
    }

    /// One pass over every locality. Returns false if shutdown arrived.
    async fn sweep(&mut self) -> bool {
        tracing::info!(localities = self.config.locality_count, "locality sweep starting");
        let mut added = 0;

        for locality in 0..self.config.locality_count {
            let pause = self.jitter.between(self.config.sweep_delay());
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("locality sweep shutting down");
                    return false;
                }
                _ = tokio::time::sleep(pause) => {}
            }

            let localities = [locality];
            let fetched = tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("locality sweep shutting down");
                    return false;
                }
                summary = refresh(self.discovery.as_ref(), &self.reconciler, &localities) => summary,
            };
            if let Some(summary) = fetched {
                added += summary.added;
            }
        }

        tracing::info!(added, "locality sweep finished");
        true
    }
}

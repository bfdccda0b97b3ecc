//! beacond — endpoint liveness monitoring daemon.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use beacon_core::config::BeaconConfig;
use beacon_core::Jitter;
use beacon_services::{
    DiscoverySource, MonitorContext, PersistenceStore, Scheduler, SqliteStore, StatusReporter,
    SweepLoop,
};

mod discovery;
mod session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BeaconConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BeaconConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BeaconConfig::default()
    });
    tracing::info!(
        store = %config.store.path.display(),
        discovery = %config.discovery.url,
        "beacond starting"
    );

    // Store
    if config.store.path.as_os_str().is_empty() {
        anyhow::bail!("store path is not configured (set [store] path or BEACON_STORE__PATH)");
    }
    let store = Arc::new(
        SqliteStore::open(&config.store.path)
            .with_context(|| format!("failed to open store at {}", config.store.path.display()))?,
    );
    let stored = store.load_all().context("failed to load stored endpoints")?;
    let (reporter, _store_worker) = StatusReporter::spawn(store.clone());

    // Shared state
    let jitter = match config.monitor.seed {
        Some(seed) => {
            tracing::info!(seed, "using seeded jitter");
            Jitter::from_seed(seed)
        }
        None => Jitter::from_entropy(),
    };
    let sessions = Arc::new(session::TcpProbeFactory::new(config.probe.clone()));
    let ctx = MonitorContext::new(config.monitor.clone(), reporter, jitter, sessions);

    let discovery: Option<Arc<dyn DiscoverySource>> = if config.discovery.enabled() {
        let client = discovery::HttpDiscovery::new(&config.discovery)
            .context("failed to build discovery client")?;
        Some(Arc::new(client))
    } else {
        tracing::warn!("no discovery url configured, monitoring stored endpoints only");
        None
    };

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let scheduler = Scheduler::new(
        ctx.clone(),
        discovery.clone(),
        config.discovery.clone(),
        shutdown_tx.subscribe(),
    );
    scheduler.seed(&stored, Instant::now());
    let scheduler_task = tokio::spawn(scheduler.run());

    let _sweep_task = match (&discovery, config.discovery.sweep) {
        (Some(discovery), true) => Some(tokio::spawn(
            SweepLoop::new(
                &ctx,
                discovery.clone(),
                config.discovery.clone(),
                shutdown_tx.subscribe(),
            )
            .run(),
        )),
        _ => None,
    };

    if config.api.enabled {
        let state = beacon_api::ApiState::new(ctx.registry.clone());
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = beacon_api::serve(state, port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    // The scheduler only returns after shutdown, once every monitor has
    // acknowledged its disconnect and the final statuses are flushed.
    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "scheduler task failed");
    }

    tracing::info!("beacond stopped");
    Ok(())
}

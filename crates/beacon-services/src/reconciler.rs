//! Reconciler — folds a discovery batch into the registry.
//!
//! Known identities are refreshed (and possibly migrated to a new port);
//! unknown ones get a new monitor whose first connect is staggered. Nothing
//! is ever removed here; stale monitors remove themselves.

use std::collections::HashSet;
use std::time::Instant;

use beacon_core::{EndpointRecord, StatusCode};

use crate::context::MonitorContext;
use crate::monitor::EndpointMonitor;
use crate::registry::lock_monitor;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub refreshed: usize,
    pub migrated: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    ctx: MonitorContext,
}

impl Reconciler {
    pub fn new(ctx: MonitorContext) -> Self {
        Self { ctx }
    }

    /// Returns an empty summary without touching the registry once the
    /// context is closed for shutdown.
    pub fn reconcile(&self, batch: &[EndpointRecord], now: Instant) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let Some(_admitted) = self.ctx.admit() else {
            tracing::debug!(endpoints = batch.len(), "shutting down, discovery batch dropped");
            return summary;
        };
        let mut seen = HashSet::with_capacity(batch.len());

        for record in batch {
            let identity = record.identity();
            if !seen.insert(identity.clone()) {
                continue;
            }

            let (handle, created) = self.ctx.registry.get_or_create(identity, || {
                EndpointMonitor::new(record.clone(), self.ctx.clone(), now)
            });
            let mut monitor = lock_monitor(&handle);

            if created {
                summary.added += 1;
                let delay = self.ctx.config.stagger(summary.added as u32);
                monitor.report(StatusCode::Pending, "new endpoint");
                monitor.schedule_connect(now + delay);
                continue;
            }

            summary.refreshed += 1;
            monitor.mark_seen(now);

            let attempts = monitor.state().reconnect_attempt_count;
            if attempts > self.ctx.config.migrate_after_attempts
                && monitor.record().port != record.port
            {
                monitor.migrate_to(record.clone());
                summary.migrated += 1;
            }
        }

        if summary.added > 0 || summary.migrated > 0 {
            tracing::info!(
                monitors = self.ctx.registry.len(),
                added = summary.added,
                migrated = summary.migrated,
                "reconciled discovery batch"
            );
        } else {
            tracing::debug!(
                monitors = self.ctx.registry.len(),
                refreshed = summary.refreshed,
                "reconciled discovery batch"
            );
        }

        summary
    }
}

//! Monitor registry — one monitor per endpoint identity.
//!
//! The map only ever hands out cloned `Arc` handles; no map guard is held
//! while a monitor is locked. Ticks iterate over a snapshot, so the scan
//! never blocks inserts or removals, and a monitor may remove itself from
//! the registry while its own lock is held.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use beacon_core::EndpointIdentity;

use crate::monitor::{EndpointMonitor, MonitorView, Phase};

/// Shared handle to one monitor. Tick and event handling both go through
/// this mutex, which keeps them mutually exclusive.
pub type MonitorHandle = Arc<Mutex<EndpointMonitor>>;

/// Lock a monitor, recovering the guard if a previous holder panicked.
pub fn lock_monitor(handle: &MonitorHandle) -> MutexGuard<'_, EndpointMonitor> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone, Default)]
pub struct Registry {
    monitors: Arc<DashMap<EndpointIdentity, MonitorHandle>>,
}

/// Number of monitors per phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseCounts {
    pub total: usize,
    pub idle: usize,
    pub connecting: usize,
    pub authenticating: usize,
    pub online: usize,
    pub retrying: usize,
    pub removing: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the monitor for `identity`, creating it with `create` if absent.
    /// The boolean is true when this call created it.
    ///
    /// `create` runs under the map's shard lock and must not touch the
    /// registry.
    pub fn get_or_create(
        &self,
        identity: EndpointIdentity,
        create: impl FnOnce() -> EndpointMonitor,
    ) -> (MonitorHandle, bool) {
        match self.monitors.entry(identity) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(v) => {
                let handle = Arc::new(Mutex::new(create()));
                v.insert(handle.clone());
                (handle, true)
            }
        }
    }

    pub fn get(&self, identity: &EndpointIdentity) -> Option<MonitorHandle> {
        self.monitors.get(identity).map(|e| e.value().clone())
    }

    pub fn contains(&self, identity: &EndpointIdentity) -> bool {
        self.monitors.contains_key(identity)
    }

    /// Remove a monitor. Removing an absent identity is a no-op.
    pub fn remove(&self, identity: &EndpointIdentity) -> Option<MonitorHandle> {
        self.monitors.remove(identity).map(|(_, handle)| handle)
    }

    /// Stable list of handles, taken without holding any guard afterwards.
    pub fn snapshot(&self) -> Vec<MonitorHandle> {
        self.monitors.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Read-only views of every monitor, sorted by address.
    pub fn views(&self, now: Instant) -> Vec<MonitorView> {
        let mut views: Vec<MonitorView> = self
            .snapshot()
            .iter()
            .map(|h| lock_monitor(h).view(now))
            .collect();
        views.sort_by(|a, b| a.address.cmp(&b.address).then(a.transport.cmp(&b.transport)));
        views
    }

    pub fn counts(&self) -> PhaseCounts {
        let mut counts = PhaseCounts::default();
        for handle in self.snapshot() {
            counts.total += 1;
            match lock_monitor(&handle).phase() {
                Phase::Idle => counts.idle += 1,
                Phase::Connecting => counts.connecting += 1,
                Phase::Authenticating => counts.authenticating += 1,
                Phase::Online => counts.online += 1,
                Phase::Retrying => counts.retrying += 1,
                Phase::Removing => counts.removing += 1,
            }
        }
        counts
    }
}

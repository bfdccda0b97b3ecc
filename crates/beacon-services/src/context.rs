//! Shared handles every monitor and the scheduler need.
//!
//! Built once at startup and cloned into each component. Nothing in this
//! crate reaches for global state.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use beacon_core::config::MonitorConfig;
use beacon_core::Jitter;

use crate::registry::Registry;
use crate::reporter::StatusReporter;
use crate::session::SessionFactory;

#[derive(Clone)]
pub struct MonitorContext {
    pub config: Arc<MonitorConfig>,
    pub registry: Registry,
    pub reporter: StatusReporter,
    pub jitter: Jitter,
    pub sessions: Arc<dyn SessionFactory>,
    /// False once shutdown has begun. Reconciles hold the read side.
    accepting: Arc<RwLock<bool>>,
}

impl MonitorContext {
    pub fn new(
        config: MonitorConfig,
        reporter: StatusReporter,
        jitter: Jitter,
        sessions: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Registry::new(),
            reporter,
            jitter,
            sessions,
            accepting: Arc::new(RwLock::new(true)),
        }
    }

    /// Stop admitting discovery batches. Blocks until any reconcile in
    /// progress has finished, so no monitor is created after this returns.
    pub fn close(&self) {
        *self.accepting.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_closed(&self) -> bool {
        !*self.accepting.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Guard held for the length of one reconcile. `None` after `close`.
    pub(crate) fn admit(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let guard = self.accepting.read().unwrap_or_else(PoisonError::into_inner);
        if *guard {
            Some(guard)
        } else {
            None
        }
    }
}

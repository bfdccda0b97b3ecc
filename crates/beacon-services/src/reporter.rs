//! Status reporting — deduplicates consecutive identical statuses and queues
//! persistence writes for the store worker.
//!
//! Callers never block on storage. Every write is a `StoreOp` sent to a
//! single worker task which applies them in order on the blocking pool.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use beacon_core::{EndpointIdentity, EndpointRecord, StatusCode};

use crate::monitor::MonitorState;
use crate::store::PersistenceStore;

/// A queued store write.
#[derive(Debug)]
pub enum StoreOp {
    Upsert {
        record: EndpointRecord,
        status: StatusCode,
    },
    Migrate {
        identity: EndpointIdentity,
        record: EndpointRecord,
    },
    Delete {
        identity: EndpointIdentity,
    },
    ResetAll {
        status: StatusCode,
    },
    /// Completes once every op queued before it has been applied.
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StoreOp>,
}

impl StatusReporter {
    /// Create a reporter and the receiving end for `run_store_worker`.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StoreOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a reporter whose worker is already running on the current runtime.
    pub fn spawn(store: Arc<dyn PersistenceStore>) -> (Self, tokio::task::JoinHandle<()>) {
        let (reporter, rx) = Self::channel();
        let worker = tokio::spawn(run_store_worker(store, rx));
        (reporter, worker)
    }

    /// Report `code` for the monitor owning `state`.
    ///
    /// No-op when `code` equals the last reported status. Returns whether a
    /// write was queued.
    pub fn notify(&self, state: &mut MonitorState, code: StatusCode, detail: &str) -> bool {
        let record = &state.record;

        if state.last_reported_status == Some(code) {
            tracing::debug!(
                address = %record,
                status = %code,
                detail,
                "status unchanged"
            );
            return false;
        }

        tracing::info!(
            address = %record,
            transport = record.transport.label(),
            locality = %record.locality,
            status = %code,
            previous = state.last_reported_status.map(|c| c.name()).unwrap_or("-"),
            detail,
            "status changed"
        );

        state.last_reported_status = Some(code);
        state.last_report_detail = Some(detail.to_string());
        self.send(StoreOp::Upsert {
            record: record.clone(),
            status: code,
        });
        true
    }

    /// Persist an address change for an existing endpoint.
    pub fn migrate(&self, identity: &EndpointIdentity, record: &EndpointRecord) {
        self.send(StoreOp::Migrate {
            identity: identity.clone(),
            record: record.clone(),
        });
    }

    /// Delete the persisted record of a removed endpoint.
    pub fn forget(&self, record: &EndpointRecord) {
        self.send(StoreOp::Delete {
            identity: record.identity(),
        });
    }

    pub fn reset_all(&self, status: StatusCode) {
        self.send(StoreOp::ResetAll { status });
    }

    /// Wait until everything queued so far has been applied (or the worker
    /// is gone).
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(StoreOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn send(&self, op: StoreOp) {
        if let Err(e) = self.tx.send(op) {
            tracing::warn!(op = ?e.0, "store worker gone, dropping write");
        }
    }
}

/// Apply queued store ops in order until every reporter is dropped.
///
/// Failures are logged and swallowed; the in-memory state stays
/// authoritative and the next status change retries the write.
pub async fn run_store_worker(
    store: Arc<dyn PersistenceStore>,
    mut rx: mpsc::UnboundedReceiver<StoreOp>,
) {
    tracing::debug!("store worker started");

    while let Some(op) = rx.recv().await {
        let op = match op {
            StoreOp::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            other => other,
        };

        let what = format!("{:?}", op);
        let store = store.clone();
        match tokio::task::spawn_blocking(move || apply(store.as_ref(), op)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, op = %what, "store write failed"),
            Err(e) => tracing::error!(error = %e, op = %what, "store write task panicked"),
        }
    }

    tracing::debug!("store worker stopped");
}

fn apply(store: &dyn PersistenceStore, op: StoreOp) -> Result<(), crate::store::StoreError> {
    match op {
        StoreOp::Upsert { record, status } => store.upsert_status(&record, status),
        StoreOp::Migrate { identity, record } => store.update_address(&identity, &record),
        StoreOp::Delete { identity } => store.delete_endpoint(&identity),
        StoreOp::ResetAll { status } => {
            let n = store.reset_all_statuses(status)?;
            tracing::info!(rows = n, status = %status, "reset all statuses");
            Ok(())
        }
        StoreOp::Flush(done) => {
            let _ = done.send(());
            Ok(())
        }
    }
}

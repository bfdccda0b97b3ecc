//! beacon-services — the monitoring engine.
//!
//! Registry, per-endpoint monitors, reconciliation of discovery batches,
//! status reporting and the scheduler that drives them, plus the traits
//! through which the engine talks to sessions, discovery and storage.

pub mod context;
pub mod discovery;
pub mod monitor;
pub mod reconciler;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::MonitorContext;
pub use discovery::{DiscoveryError, DiscoverySource};
pub use monitor::{EndpointMonitor, MonitorState, MonitorView, Phase};
pub use reconciler::{ReconcileSummary, Reconciler};
pub use registry::{lock_monitor, MonitorHandle, PhaseCounts, Registry};
pub use reporter::{run_store_worker, StatusReporter, StoreOp};
pub use scheduler::{refresh, stop, Scheduler, SweepLoop};
pub use session::{EventReceiver, EventSender, Session, SessionEvent, SessionFactory};
pub use store::{PersistenceStore, SqliteStore, StoreError, StoredEndpoint};

//! Session seam — the connection/authentication protocol to one endpoint.
//!
//! The engine never performs I/O itself. A `Session` is told to connect, log
//! on or disconnect, and reports what happened through the event channel it
//! was created with. Every call must return immediately; the handshake runs
//! out of line.
//!
//! Contract for implementations:
//! - `connect` replaces any previous connection without emitting events for
//!   the replaced one.
//! - `disconnect` always results in exactly one `Disconnected` event, even when
//!   nothing was connected. Shutdown relies on it as the acknowledgement.

use beacon_core::{EndpointRecord, StatusCode};
use tokio::sync::mpsc;

/// Everything a session can report. One handler per monitor consumes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(StatusCode),
    Disconnected(StatusCode),
    Authenticated(StatusCode),
    Deauthenticated(StatusCode),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub trait Session: Send {
    fn connect(&mut self, record: &EndpointRecord);
    fn logon(&mut self);
    fn disconnect(&mut self);
}

/// Builds the session owned by a new monitor.
pub trait SessionFactory: Send + Sync {
    fn create(&self, record: &EndpointRecord, events: EventSender) -> Box<dyn Session>;
}

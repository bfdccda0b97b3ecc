//! Endpoint monitor — the per-endpoint connection state machine.
//!
//! Phases:
//!   Idle → Connecting → Authenticating → Online
//!                 ↘          ↘            ↘
//!                   Retrying ←──────────────┘   (or Removing when stale)
//!
//! A monitor never performs I/O. `tick` checks the due time and asks the
//! session to connect; every other transition happens while handling a
//! `SessionEvent`. Both paths run under the monitor's own lock.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use beacon_core::{EndpointIdentity, EndpointRecord, StatusCode};

use crate::context::MonitorContext;
use crate::session::{EventReceiver, Session, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Connecting,
    Authenticating,
    Online,
    Retrying,
    /// Terminal. The monitor has left the registry.
    Removing,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Online => "online",
            Self::Retrying => "retrying",
            Self::Removing => "removing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable bookkeeping of one monitor.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub record: EndpointRecord,
    pub reconnect_attempt_count: u32,
    pub is_disconnecting: bool,
    pub last_reported_status: Option<StatusCode>,
    /// Detail line that accompanied `last_reported_status`.
    pub last_report_detail: Option<String>,
    /// Last time discovery (or the seed load) listed this endpoint.
    pub last_seen_at: Instant,
    /// Last successful authentication.
    pub last_success_at: Instant,
    pub next_connect_at: Option<Instant>,
    /// Start of the current outage, if any.
    pub down_since: Option<Instant>,
}

impl MonitorState {
    pub fn new(record: EndpointRecord, now: Instant) -> Self {
        Self {
            record,
            reconnect_attempt_count: 0,
            is_disconnecting: false,
            last_reported_status: None,
            last_report_detail: None,
            last_seen_at: now,
            last_success_at: now,
            next_connect_at: None,
            down_since: None,
        }
    }
}

/// Serializable snapshot of a monitor for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorView {
    pub address: String,
    pub host: String,
    pub port: u16,
    pub transport: &'static str,
    pub locality: String,
    pub phase: Phase,
    pub status: Option<&'static str>,
    pub detail: Option<String>,
    pub alerting: bool,
    pub attempts: u32,
    pub down_for_secs: Option<u64>,
    pub last_seen_secs: u64,
    pub last_success_secs: u64,
    pub next_connect_in_secs: Option<u64>,
}

pub struct EndpointMonitor {
    state: MonitorState,
    phase: Phase,
    session: Box<dyn Session>,
    events: EventReceiver,
    ctx: MonitorContext,
    disconnect_acknowledged: bool,
}

impl EndpointMonitor {
    /// Build an idle monitor with its session and event channel.
    pub fn new(record: EndpointRecord, ctx: MonitorContext, now: Instant) -> Self {
        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let session = ctx.sessions.create(&record, tx);
        Self {
            state: MonitorState::new(record, now),
            phase: Phase::Idle,
            session,
            events,
            ctx,
            disconnect_acknowledged: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn record(&self) -> &EndpointRecord {
        &self.state.record
    }

    pub fn identity(&self) -> EndpointIdentity {
        self.state.record.identity()
    }

    pub fn schedule_connect(&mut self, at: Instant) {
        self.state.next_connect_at = Some(at);
    }

    /// Report a status through the shared reporter.
    pub fn report(&mut self, code: StatusCode, detail: &str) -> bool {
        self.ctx.reporter.notify(&mut self.state, code, detail)
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    /// Drain pending session events, then connect if due. Never blocks.
    pub fn tick(&mut self, now: Instant) {
        if self.phase == Phase::Removing {
            return;
        }
        self.drain_events(now);
        if self.phase == Phase::Removing || self.state.is_disconnecting {
            return;
        }

        let due = self.state.next_connect_at.is_some_and(|at| now >= at);
        if due {
            self.start_connect(now);
        }
    }

    /// Handle every event queued so far. Returns how many were handled.
    pub fn drain_events(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event, now);
            handled += 1;
        }
        handled
    }

    fn start_connect(&mut self, now: Instant) {
        self.state.reconnect_attempt_count += 1;
        self.state.next_connect_at = Some(now + self.ctx.config.connect_fallback());

        if self.phase == Phase::Online {
            tracing::debug!(address = %self.state.record, "re-homing connection");
        }
        tracing::debug!(
            address = %self.state.record,
            attempt = self.state.reconnect_attempt_count,
            "connecting"
        );

        self.phase = Phase::Connecting;
        let record = self.state.record.clone();
        self.session.connect(&record);
    }

    // ── Events ────────────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) {
        if self.state.is_disconnecting {
            if let SessionEvent::Disconnected(_) = event {
                self.disconnect_acknowledged = true;
            }
            return;
        }

        match event {
            SessionEvent::Connected(code) => {
                if self.phase != Phase::Connecting {
                    tracing::debug!(address = %self.state.record, phase = %self.phase, "stale connected event");
                    return;
                }
                if code.is_ok() {
                    self.phase = Phase::Authenticating;
                    self.session.logon();
                } else {
                    self.handle_disconnect(code, now);
                }
            }
            SessionEvent::Authenticated(code) => {
                if self.phase != Phase::Authenticating {
                    tracing::debug!(address = %self.state.record, phase = %self.phase, "stale authenticated event");
                    return;
                }
                if code.is_ok() {
                    self.go_online(now);
                } else {
                    self.session.disconnect();
                    self.handle_disconnect(code, now);
                }
            }
            SessionEvent::Deauthenticated(code) => {
                if !matches!(self.phase, Phase::Authenticating | Phase::Online) {
                    return;
                }
                self.session.disconnect();
                let code = if code.is_ok() { StatusCode::LoggedOff } else { code };
                self.handle_disconnect(code, now);
            }
            SessionEvent::Disconnected(code) => {
                if matches!(
                    self.phase,
                    Phase::Connecting | Phase::Authenticating | Phase::Online
                ) {
                    self.handle_disconnect(code, now);
                }
            }
        }
    }

    fn go_online(&mut self, now: Instant) {
        let was_down = self.state.down_since.take();

        self.phase = Phase::Online;
        self.state.reconnect_attempt_count = 0;
        self.state.last_success_at = now;
        self.state.next_connect_at = Some(now + self.ctx.jitter.between(self.ctx.config.rehome_range()));

        let detail = match was_down {
            Some(since) => format!("online after {}s down", now.saturating_duration_since(since).as_secs()),
            None => "online".to_string(),
        };
        self.report(StatusCode::Ok, &detail);
    }

    fn handle_disconnect(&mut self, code: StatusCode, now: Instant) {
        let failure = if code.is_ok() { StatusCode::NoConnection } else { code };

        let unauthenticated = now.saturating_duration_since(self.state.last_success_at);
        let unseen = now.saturating_duration_since(self.state.last_seen_at);
        if unauthenticated > self.ctx.config.unauthenticated_retention()
            && unseen > self.ctx.config.unseen_retention()
        {
            self.remove();
            return;
        }

        let attempts = self.state.reconnect_attempt_count;
        let delay = self.ctx.jitter.between(self.ctx.config.retry_range(attempts == 1));
        if attempts == 0 {
            self.state.reconnect_attempt_count = 2;
        }
        let attempts = self.state.reconnect_attempt_count;

        self.state.next_connect_at = Some(now + delay);
        self.state.down_since.get_or_insert(now);
        self.phase = Phase::Retrying;

        if attempts == 1 {
            let detail = format!("{}, reconnecting in {}s", failure, delay.as_secs());
            self.report(StatusCode::Reconnecting, &detail);
        } else if attempts >= self.ctx.config.detailed_report_after_attempts {
            let detail = format!(
                "attempt {}, last seen {}s ago, last success {}s ago",
                attempts,
                unseen.as_secs(),
                unauthenticated.as_secs()
            );
            self.report(failure, &detail);
        } else {
            self.report(failure, &format!("attempt {}", attempts));
        }
    }

    /// Terminal transition: tear down, unregister, forget the stored row.
    fn remove(&mut self) {
        self.phase = Phase::Removing;
        self.state.is_disconnecting = true;
        self.state.next_connect_at = None;
        self.session.disconnect();

        let identity = self.identity();
        self.ctx.registry.remove(&identity);
        self.ctx.reporter.forget(&self.state.record);

        tracing::info!(
            address = %self.state.record,
            transport = self.state.record.transport.label(),
            "removed stale endpoint"
        );
    }

    // ── Reconciliation ────────────────────────────────────────────────────────

    pub fn mark_seen(&mut self, now: Instant) {
        self.state.last_seen_at = now;
    }

    /// Point the monitor at a new address for the same identity.
    pub fn migrate_to(&mut self, record: EndpointRecord) {
        let identity = self.identity();
        self.ctx.reporter.migrate(&identity, &record);

        tracing::info!(
            from = %self.state.record,
            to = %record,
            attempts = self.state.reconnect_attempt_count,
            "endpoint migrated"
        );

        self.state.reconnect_attempt_count = 0;
        self.state.record = record;
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    pub fn begin_shutdown(&mut self) {
        if self.state.is_disconnecting {
            return;
        }
        self.state.is_disconnecting = true;
        self.state.next_connect_at = None;
        self.session.disconnect();
    }

    /// True once the session acknowledged the shutdown disconnect.
    pub fn is_shut_down(&self) -> bool {
        self.disconnect_acknowledged || self.phase == Phase::Removing
    }

    pub fn view(&self, now: Instant) -> MonitorView {
        let s = &self.state;
        let secs_since = |at: Instant| now.saturating_duration_since(at).as_secs();
        MonitorView {
            address: s.record.address(),
            host: s.record.host.clone(),
            port: s.record.port,
            transport: s.record.transport.label(),
            locality: s.record.locality.clone(),
            phase: self.phase,
            status: s.last_reported_status.map(|c| c.name()),
            detail: s.last_report_detail.clone(),
            alerting: s.last_reported_status.is_some_and(|c| c.is_alerting()),
            attempts: s.reconnect_attempt_count,
            down_for_secs: s.down_since.map(secs_since),
            last_seen_secs: secs_since(s.last_seen_at),
            last_success_secs: secs_since(s.last_success_at),
            next_connect_in_secs: s
                .next_connect_at
                .map(|at| at.saturating_duration_since(now).as_secs()),
        }
    }
}

impl fmt::Debug for EndpointMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointMonitor")
            .field("state", &self.state)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

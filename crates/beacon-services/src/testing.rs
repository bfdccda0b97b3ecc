//! Test doubles: a scripted session factory and a context builder.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! downstream integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beacon_core::config::MonitorConfig;
use beacon_core::{EndpointIdentity, EndpointRecord, Jitter, StatusCode, Transport};
use tokio::sync::mpsc;

use crate::context::MonitorContext;
use crate::reporter::{StatusReporter, StoreOp};
use crate::session::{EventSender, Session, SessionEvent, SessionFactory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(String),
    Logon,
    Disconnect,
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Script {
    commands: HashMap<EndpointIdentity, Vec<Command>>,
    senders: HashMap<EndpointIdentity, EventSender>,
}

/// Records every session command and lets tests inject events.
#[derive(Clone, Default)]
pub struct ScriptedSessions {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSessions {
    pub fn commands(&self, record: &EndpointRecord) -> Vec<Command> {
        let script = lock(&self.script);
        script
            .commands
            .get(&record.identity())
            .cloned()
            .unwrap_or_default()
    }

    pub fn emit(&self, record: &EndpointRecord, event: SessionEvent) {
        let script = lock(&self.script);
        if let Some(tx) = script.senders.get(&record.identity()) {
            let _ = tx.send(event);
        }
    }

    pub fn created(&self) -> usize {
        lock(&self.script).senders.len()
    }
}

impl SessionFactory for ScriptedSessions {
    fn create(&self, record: &EndpointRecord, events: EventSender) -> Box<dyn Session> {
        let identity = record.identity();
        lock(&self.script)
            .senders
            .insert(identity.clone(), events.clone());
        Box::new(ScriptedSession {
            identity,
            events,
            script: self.script.clone(),
        })
    }
}

struct ScriptedSession {
    identity: EndpointIdentity,
    events: EventSender,
    script: Arc<Mutex<Script>>,
}

impl ScriptedSession {
    fn log(&self, command: Command) {
        lock(&self.script)
            .commands
            .entry(self.identity.clone())
            .or_default()
            .push(command);
    }
}

impl Session for ScriptedSession {
    fn connect(&mut self, record: &EndpointRecord) {
        self.log(Command::Connect(record.address()));
    }

    fn logon(&mut self) {
        self.log(Command::Logon);
    }

    fn disconnect(&mut self) {
        self.log(Command::Disconnect);
        let _ = self.events.send(SessionEvent::Disconnected(StatusCode::Ok));
    }
}

pub struct TestContext {
    pub ctx: MonitorContext,
    pub sessions: ScriptedSessions,
    pub store_rx: mpsc::UnboundedReceiver<StoreOp>,
}

impl TestContext {
    /// Every store op queued since the last call.
    pub fn ops(&mut self) -> Vec<StoreOp> {
        let mut ops = Vec::new();
        while let Ok(op) = self.store_rx.try_recv() {
            ops.push(op);
        }
        ops
    }

    /// Statuses written since the last call, in order.
    pub fn upserts(&mut self) -> Vec<StatusCode> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Upsert { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }
}

pub fn context(seed: u64) -> TestContext {
    let sessions = ScriptedSessions::default();
    let (reporter, store_rx) = StatusReporter::channel();
    let ctx = MonitorContext::new(
        MonitorConfig::default(),
        reporter,
        Jitter::from_seed(seed),
        Arc::new(sessions.clone()),
    );
    TestContext {
        ctx,
        sessions,
        store_rx,
    }
}

pub fn record(host: &str, port: u16) -> EndpointRecord {
    EndpointRecord::new(host, port, "ams", Transport::Tcp)
}

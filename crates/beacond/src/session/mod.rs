//! TCP probe session.
//!
//! "Connecting" is a TCP connect with a timeout. "Logging on" writes the
//! configured greeting and waits for any reply. After that the connection is
//! held open and EOF or a read error is reported as a disconnect.
//!
//! Each `connect` spawns one probe task and aborts the previous one, so a
//! replaced connection never reports anything.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use beacon_core::config::ProbeConfig;
use beacon_core::{EndpointRecord, StatusCode};
use beacon_services::{EventSender, Session, SessionEvent, SessionFactory};

pub struct TcpProbeFactory {
    probe: Arc<ProbeConfig>,
    runtime: Handle,
}

impl TcpProbeFactory {
    /// Must be called from inside the runtime that will run the probes.
    pub fn new(probe: ProbeConfig) -> Self {
        Self {
            probe: Arc::new(probe),
            runtime: Handle::current(),
        }
    }
}

impl SessionFactory for TcpProbeFactory {
    fn create(&self, _record: &EndpointRecord, events: EventSender) -> Box<dyn Session> {
        Box::new(TcpProbeSession {
            events,
            probe: self.probe.clone(),
            runtime: self.runtime.clone(),
            task: None,
            logon: None,
        })
    }
}

pub struct TcpProbeSession {
    events: EventSender,
    probe: Arc<ProbeConfig>,
    runtime: Handle,
    task: Option<JoinHandle<()>>,
    logon: Option<oneshot::Sender<()>>,
}

impl TcpProbeSession {
    fn abort(&mut self) {
        self.logon = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Session for TcpProbeSession {
    fn connect(&mut self, record: &EndpointRecord) {
        self.abort();

        let (logon_tx, logon_rx) = oneshot::channel();
        self.logon = Some(logon_tx);
        self.task = Some(self.runtime.spawn(run_probe(
            record.address(),
            self.events.clone(),
            self.probe.clone(),
            logon_rx,
        )));
    }

    fn logon(&mut self) {
        if let Some(tx) = self.logon.take() {
            let _ = tx.send(());
        }
    }

    fn disconnect(&mut self) {
        self.abort();
        let _ = self.events.send(SessionEvent::Disconnected(StatusCode::Ok));
    }
}

impl Drop for TcpProbeSession {
    fn drop(&mut self) {
        self.abort();
    }
}

fn classify(e: &io::Error) -> StatusCode {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => StatusCode::Refused,
        io::ErrorKind::TimedOut => StatusCode::Timeout,
        _ => StatusCode::NoConnection,
    }
}

async fn run_probe(
    address: String,
    events: EventSender,
    probe: Arc<ProbeConfig>,
    logon: oneshot::Receiver<()>,
) {
    let emit = |event: SessionEvent| {
        let _ = events.send(event);
    };

    let mut stream = match timeout(probe.connect_timeout(), TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(address = %address, error = %e, "connect failed");
            emit(SessionEvent::Disconnected(classify(&e)));
            return;
        }
        Err(_) => {
            tracing::debug!(address = %address, "connect timed out");
            emit(SessionEvent::Disconnected(StatusCode::Timeout));
            return;
        }
    };
    emit(SessionEvent::Connected(StatusCode::Ok));

    // Sender dropped: the session was replaced or torn down.
    if logon.await.is_err() {
        return;
    }

    if let Err(e) = stream.write_all(probe.greeting.as_bytes()).await {
        tracing::debug!(address = %address, error = %e, "greeting write failed");
        emit(SessionEvent::Disconnected(classify(&e)));
        return;
    }

    let mut buf = [0u8; 512];
    match timeout(probe.logon_timeout(), stream.read(&mut buf)).await {
        Ok(Ok(0)) => {
            emit(SessionEvent::Disconnected(StatusCode::NoConnection));
            return;
        }
        Ok(Ok(_)) => emit(SessionEvent::Authenticated(StatusCode::Ok)),
        Ok(Err(e)) => {
            emit(SessionEvent::Disconnected(classify(&e)));
            return;
        }
        Err(_) => {
            emit(SessionEvent::Authenticated(StatusCode::Timeout));
            return;
        }
    }

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(address = %address, error = %e, "read failed");
                break;
            }
        }
    }
    emit(SessionEvent::Disconnected(StatusCode::NoConnection));
}

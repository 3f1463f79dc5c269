//! Connection controller owning one transport's lifecycle

use crate::error::{LinkError, Result};
use crate::events::{DeviceEvent, EventSender};
use crate::transport::traits::{
    self, Endpoint, Received, TransportConnector, TransportReader, TransportWriter,
};
use device_link_shared::codec::{self, LineFramer};
use device_link_shared::state_machine::{LinkEvent, LinkStateMachine};
use device_link_shared::{Category, ConnectionState, MessageEvent, TransportKind};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of a controller for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub kind: TransportKind,
    pub state: ConnectionState,
    /// Last endpoint tried; kept after disconnect
    pub endpoint: Option<Endpoint>,
}

/// Connects, talks to and disconnects from one device over one transport.
///
/// State and the transport belong to the controller. A spawned receive
/// loop reads while connected and only reaches state through the same
/// close path the caller uses.
pub struct ConnectionController {
    inner: Arc<Inner>,
}

struct Inner {
    kind: TransportKind,
    connector: Arc<dyn TransportConnector>,
    events: EventSender,
    session: Mutex<Session>,
    /// Write half of the open transport, tagged with its generation.
    /// Kept apart from the session so a slow write never blocks state queries.
    writer: Mutex<Option<(u64, TransportWriter)>>,
    /// Parent of every session's cancel token; cancelled on drop
    shutdown: CancellationToken,
}

/// Everything that changes between connections
struct Session {
    fsm: LinkStateMachine,
    endpoint: Option<Endpoint>,
    receiver: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// Rolls a connect attempt back if its future is dropped mid-flight
struct PendingConnect {
    inner: Arc<Inner>,
    generation: u64,
    endpoint: Endpoint,
    done: bool,
}

impl PendingConnect {
    fn finish(&mut self) {
        self.done = true;
    }
}

impl Drop for PendingConnect {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Ok(mut session) = self.inner.session.try_lock() {
            self.inner
                .abandon_connect(&mut session, self.generation, &self.endpoint);
            return;
        }

        // Someone holds the session; finish the rollback on the runtime
        let inner = self.inner.clone();
        let generation = self.generation;
        let endpoint = self.endpoint.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut session = inner.session.lock().await;
                inner.abandon_connect(&mut session, generation, &endpoint);
            });
        }
    }
}

/// Who asked for the connection to close
enum CloseOrigin {
    Caller,
    SendFailed { generation: u64 },
    ReceiveLoop { generation: u64, reason: String },
}

impl CloseOrigin {
    fn generation(&self) -> Option<u64> {
        match self {
            CloseOrigin::Caller => None,
            CloseOrigin::SendFailed { generation } | CloseOrigin::ReceiveLoop { generation, .. } => {
                Some(*generation)
            }
        }
    }

    fn event(&self) -> LinkEvent {
        match self {
            CloseOrigin::Caller | CloseOrigin::SendFailed { .. } => LinkEvent::CloseRequested,
            CloseOrigin::ReceiveLoop { .. } => LinkEvent::LinkLost,
        }
    }
}

impl ConnectionController {
    /// Create a disconnected controller emitting into `events`
    pub fn new(connector: Arc<dyn TransportConnector>, events: EventSender) -> Self {
        let shutdown = CancellationToken::new();
        let session = Session {
            fsm: LinkStateMachine::new(),
            endpoint: None,
            receiver: None,
            cancel: shutdown.child_token(),
        };

        Self {
            inner: Arc::new(Inner {
                kind: connector.kind(),
                connector,
                events,
                session: Mutex::new(session),
                writer: Mutex::new(None),
                shutdown,
            }),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn connector(&self) -> &Arc<dyn TransportConnector> {
        &self.inner.connector
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.session.lock().await.fsm.state()
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn endpoint(&self) -> Option<Endpoint> {
        self.inner.session.lock().await.endpoint.clone()
    }

    pub async fn info(&self) -> ConnectionInfo {
        let session = self.inner.session.lock().await;
        ConnectionInfo {
            kind: self.inner.kind,
            state: session.fsm.state(),
            endpoint: session.endpoint.clone(),
        }
    }

    /// Status label while connected
    pub async fn connected_label(&self) -> Option<String> {
        let session = self.inner.session.lock().await;
        match (session.fsm.state(), &session.endpoint) {
            (ConnectionState::Connected, Some(endpoint)) => Some(endpoint.label()),
            _ => None,
        }
    }

    /// Whether a receive loop task is still running
    pub async fn has_receive_loop(&self) -> bool {
        let session = self.inner.session.lock().await;
        session
            .receiver
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Connect to `endpoint`, waiting up to the transport's connect timeout.
    ///
    /// Only valid while disconnected. On failure the controller is left
    /// disconnected and an error event plus a status event are emitted.
    /// Dropping the future before it completes counts as a failure.
    pub async fn connect(&self, endpoint: Endpoint) -> Result<()> {
        let inner = &self.inner;

        let generation = {
            let mut session = inner.session.lock().await;
            if !session.fsm.process_event(LinkEvent::ConnectRequested).changed() {
                let err = LinkError::Busy(session.fsm.state());
                inner.emit(Category::Error, format!("Cannot connect to {}: {}", endpoint, err));
                return Err(err);
            }
            session.endpoint = Some(endpoint.clone());
            session.fsm.generation()
        };

        let mut pending = PendingConnect {
            inner: inner.clone(),
            generation,
            endpoint: endpoint.clone(),
            done: false,
        };

        info!("[{}] Connecting to {}", inner.kind, endpoint);
        let result = inner.connector.connect(&endpoint).await;

        let mut session = inner.session.lock().await;
        if session.fsm.generation() != generation
            || session.fsm.state() != ConnectionState::Connecting
        {
            // close() ran while we were connecting; it already reported
            pending.finish();
            debug!("[{}] Connect to {} cancelled", inner.kind, endpoint);
            return Err(LinkError::Cancelled);
        }

        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                pending.finish();
                session.fsm.process_event(LinkEvent::ConnectFailed);
                inner.emit(Category::Error, format!("Unable to connect to {}: {}", endpoint, err));
                inner.emit_status(false, String::new());
                return Err(err);
            }
        };

        let (reader, writer) = traits::split(
            stream,
            inner.connector.read_timeout(),
            inner.connector.read_buffer_size(),
        );
        // Writer goes in before Connected is visible to senders
        *inner.writer.lock().await = Some((generation, writer));
        pending.finish();

        session.fsm.process_event(LinkEvent::ConnectSucceeded);
        let cancel = inner.shutdown.child_token();
        session.cancel = cancel.clone();

        inner.emit(Category::System, format!("Connected to {}", endpoint));
        inner.emit_status(true, endpoint.label());

        session.receiver = Some(tokio::spawn(receive_loop(
            self.inner.clone(),
            generation,
            reader,
            cancel,
        )));
        Ok(())
    }

    /// Send one line of text, adding the newline if it is missing.
    ///
    /// A write failure closes the connection.
    pub async fn send(&self, text: &str) -> Result<()> {
        let inner = &self.inner;
        let generation = {
            let session = inner.session.lock().await;
            if session.fsm.state() != ConnectionState::Connected {
                return Err(LinkError::NotConnected);
            }
            session.fsm.generation()
        };

        let mut slot = inner.writer.lock().await;
        let writer = match slot.as_mut() {
            Some((owner, writer)) if *owner == generation => writer,
            _ => return Err(LinkError::NotConnected),
        };

        let payload = codec::encode_line(text);
        let written = writer.send(&payload).await;
        match written {
            Ok(()) => {
                inner.emit(Category::Sent, text.trim());
                Ok(())
            }
            Err(e) => {
                inner.emit(Category::Error, format!("Failed to send message: {}", e));
                drop(slot);
                inner.close_session(CloseOrigin::SendFailed { generation }).await;
                Err(LinkError::Io(e))
            }
        }
    }

    /// Close the connection. Safe to call in any state; only a call that
    /// actually disconnects emits events. Returns once the receive loop
    /// has stopped.
    pub async fn close(&self) {
        self.inner.close_session(CloseOrigin::Caller).await;
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    fn emit(&self, category: Category, text: impl Into<String>) {
        let message = MessageEvent::new(category, text);
        match category {
            Category::Error => warn!("[{}] {}", self.kind, message.text),
            _ => debug!("[{}] {}: {}", self.kind, category, message.text),
        }
        let _ = self.events.send(DeviceEvent::Message {
            kind: self.kind,
            message,
        });
    }

    fn emit_status(&self, connected: bool, label: String) {
        let _ = self.events.send(DeviceEvent::StatusChanged {
            kind: self.kind,
            connected,
            label,
        });
    }

    /// Undo a connect whose caller went away before it finished
    fn abandon_connect(&self, session: &mut Session, generation: u64, endpoint: &Endpoint) {
        if session.fsm.generation() != generation
            || session.fsm.state() != ConnectionState::Connecting
        {
            return;
        }
        session.fsm.process_event(LinkEvent::ConnectFailed);
        self.emit(
            Category::Error,
            format!("Connect to {} abandoned before it completed", endpoint),
        );
        self.emit_status(false, String::new());
    }

    async fn close_session(&self, origin: CloseOrigin) {
        let (generation, receiver) = {
            let mut session = self.session.lock().await;
            if let Some(generation) = origin.generation() {
                if generation != session.fsm.generation() {
                    return;
                }
            }
            if !session.fsm.process_event(origin.event()).changed() {
                return;
            }

            // Stop the loop before the transport goes away
            session.cancel.cancel();

            if let CloseOrigin::ReceiveLoop { reason, .. } = &origin {
                self.emit(Category::Error, reason.clone());
            }
            let target = session
                .endpoint
                .as_ref()
                .map(|endpoint| endpoint.to_string())
                .unwrap_or_default();
            info!("[{}] Disconnected from {}", self.kind, target);
            self.emit(Category::System, format!("Disconnected from {}", target));
            self.emit_status(false, String::new());

            (session.fsm.generation(), session.receiver.take())
        };

        // Waits out a write in progress; state is already Disconnected
        let writer = {
            let mut slot = self.writer.lock().await;
            match slot.take() {
                Some((owner, writer)) if owner == generation => Some(writer),
                other => {
                    *slot = other;
                    None
                }
            }
        };

        if let Some(mut writer) = writer {
            if let Err(e) = writer.close().await {
                debug!("[{}] Ignoring error while closing transport: {}", self.kind, e);
            }
        }

        // The receive loop cannot wait for itself
        if !matches!(origin, CloseOrigin::ReceiveLoop { .. }) {
            if let Some(handle) = receiver {
                if let Err(e) = handle.await {
                    debug!("[{}] Receive loop ended abnormally: {}", self.kind, e);
                }
            }
        }
    }
}

/// Read chunks until cancelled, the remote closes, or a read fails
async fn receive_loop(
    inner: Arc<Inner>,
    generation: u64,
    mut reader: TransportReader,
    cancel: CancellationToken,
) {
    let mut framer = LineFramer::new();

    let reason = loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("[{}] Receive loop cancelled", inner.kind);
                return;
            }
            received = reader.receive_chunk() => received,
        };

        match received {
            Received::Data(chunk) => {
                for line in framer.feed(&chunk) {
                    if cancel.is_cancelled() {
                        return;
                    }
                    inner.emit(Category::Device, line);
                }
            }
            Received::TimedOut => continue,
            Received::Eof => break "Connection closed by device".to_string(),
            Received::Failed(e) => break format!("Failed to receive message: {}", e),
        }
    };

    inner
        .close_session(CloseOrigin::ReceiveLoop { generation, reason })
        .await;
}

//! Realtime transport session.
//!
//! DESIGN
//! ======
//! One [`TransportSession`] owns at most one supervisor task. The supervisor
//! connects (websocket upgrade, Engine.IO open, Socket.IO connect with the
//! bearer token), then relays frames until the connection ends, reconnecting
//! with capped exponential delay up to the configured attempt bound.
//!
//! The session never touches sync state. It republishes lifecycle and domain
//! events on an unbounded channel, in arrival order, and exposes its
//! connection state through a `watch` channel.
//!
//! LIFECYCLE
//! =========
//! 1. `open(token)` → tears down any prior supervisor, spawns a new one
//! 2. connect ok → `Connected`; connection lost → `Disconnected { reason }`
//! 3. connect failure → `ConnectionError { reason }`, retry after delay
//! 4. attempts exhausted, server disconnect, or auth rejection → terminal
//!    `ConnectionState::Disconnected`; only a new `open` reconnects
//! 5. `close()` → Socket.IO disconnect + websocket close, no further events
//!
//! ERROR HANDLING
//! ==============
//! Connection failures are counted and logged, never returned to callers.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use frames::{Packet, SocketPacket};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::events::{OutboundEvent, TransportEvent};
use crate::config::{TransportConfig, TransportKind};

/// How long `close` waits for the supervisor to say goodbye before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub const REASON_SERVER_DISCONNECT: &str = "io server disconnect";
pub const REASON_TRANSPORT_CLOSE: &str = "transport close";
pub const REASON_PING_TIMEOUT: &str = "ping timeout";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Observable connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Terminal: gave up or was refused. Requires a new `open`.
    Disconnected,
    /// Closed on request.
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid socket URL: {0}")]
    InvalidUrl(String),
    #[error("no supported transport configured")]
    NoTransport,
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The server refused the Socket.IO connect (e.g. invalid token).
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Codec(#[from] frames::CodecError),
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

// =============================================================================
// REALTIME SEAM
// =============================================================================

/// What the bridge and auth flow need from a realtime connection.
#[async_trait]
pub trait Realtime: Send {
    fn is_connected(&self) -> bool;
    /// Queue an outbound event. Returns `false` when no session is open.
    fn emit(&self, event: OutboundEvent) -> bool;
    async fn open(&mut self, token: &str);
    async fn close(&mut self);
}

// =============================================================================
// SESSION
// =============================================================================

struct ActiveSession {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct TransportSession {
    config: TransportConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    errors: Arc<AtomicU64>,
    active: Option<ActiveSession>,
}

impl TransportSession {
    /// Create a closed session and the receiver its events are published on.
    #[must_use]
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Idle);
        let session = Self { config, events, state: Arc::new(state), errors: Arc::new(AtomicU64::new(0)), active: None };
        (session, events_rx)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connection failures seen since this session was created.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Start a supervisor for `token`, replacing any existing one.
    pub async fn open(&mut self, token: &str) {
        self.close().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = Supervisor {
            config: self.config.clone(),
            token: token.to_owned(),
            events: self.events.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            state: Arc::clone(&self.state),
            errors: Arc::clone(&self.errors),
        };
        self.state.send_replace(ConnectionState::Connecting);
        let task = tokio::spawn(supervisor.run());
        self.active = Some(ActiveSession { outbound: outbound_tx, shutdown: shutdown_tx, task });
    }

    /// Stop the supervisor. No events are published afterwards.
    pub async fn close(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let ActiveSession { outbound, shutdown, mut task } = active;
        drop(outbound);
        let _ = shutdown.send(());
        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            warn!("transport: supervisor did not stop in time, aborting");
            task.abort();
        }
        self.state.send_replace(ConnectionState::Closed);
        info!("transport: closed");
    }
}

#[async_trait]
impl Realtime for TransportSession {
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn emit(&self, event: OutboundEvent) -> bool {
        self.active.as_ref().is_some_and(|active| active.outbound.send(event).is_ok())
    }

    async fn open(&mut self, token: &str) {
        TransportSession::open(self, token).await;
    }

    async fn close(&mut self) {
        TransportSession::close(self).await;
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

// =============================================================================
// SUPERVISOR
// =============================================================================

/// How one established connection ended.
enum End {
    Shutdown,
    ServerDisconnect,
    Lost(String),
}

struct Supervisor {
    config: TransportConfig,
    token: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    shutdown: oneshot::Receiver<()>,
    state: Arc<watch::Sender<ConnectionState>>,
    errors: Arc<AtomicU64>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            let connecting =
                if attempt == 0 { ConnectionState::Connecting } else { ConnectionState::Reconnecting { attempt } };
            self.state.send_replace(connecting);

            let result = tokio::select! {
                _ = &mut self.shutdown => return,
                result = connect(&self.config, &self.token) => result,
            };

            match result {
                Ok(ws) => {
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Connected);
                    self.publish(TransportEvent::Connected);

                    match self.relay(ws).await {
                        End::Shutdown => return,
                        End::ServerDisconnect => {
                            info!("transport: server closed the session");
                            self.publish(TransportEvent::Disconnected { reason: REASON_SERVER_DISCONNECT.to_owned() });
                            self.state.send_replace(ConnectionState::Disconnected);
                            return;
                        }
                        End::Lost(reason) => {
                            warn!(%reason, "transport: connection lost");
                            self.publish(TransportEvent::Disconnected { reason });
                        }
                    }
                }
                Err(TransportError::Rejected(reason)) => {
                    let count = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(%reason, errors = count, "transport: connection rejected");
                    self.publish(TransportEvent::ConnectionError { reason });
                    self.state.send_replace(ConnectionState::Disconnected);
                    return;
                }
                Err(e) => {
                    let count = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(error = %e, attempt, errors = count, "transport: connect failed");
                    self.publish(TransportEvent::ConnectionError { reason: e.to_string() });
                }
            }

            attempt += 1;
            if attempt > self.config.reconnect.attempts {
                warn!(attempts = self.config.reconnect.attempts, "transport: reconnect attempts exhausted");
                self.state.send_replace(ConnectionState::Disconnected);
                return;
            }

            let delay = self.config.reconnect.delay_for(attempt);
            self.state.send_replace(ConnectionState::Reconnecting { attempt });
            debug!(attempt, ?delay, "transport: reconnect scheduled");
            tokio::select! {
                _ = &mut self.shutdown => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Pump one established connection until it ends.
    async fn relay(&mut self, conn: Connection) -> End {
        let (mut sink, mut stream) = conn.ws.split();
        let liveness = conn.liveness;
        let mut deadline = Instant::now() + liveness;

        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    let _ = send_packet(&mut sink, &Packet::Message(SocketPacket::disconnect())).await;
                    let _ = sink.close().await;
                    return End::Shutdown;
                }
                () = tokio::time::sleep_until(deadline) => {
                    return End::Lost(REASON_PING_TIMEOUT.to_owned());
                }
                Some(event) = self.outbound.recv() => {
                    debug!(event = event.name(), "transport: emit");
                    if let Err(e) = send_packet(&mut sink, &Packet::Message(event.to_packet())).await {
                        return End::Lost(format!("transport error: {e}"));
                    }
                }
                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => return End::Lost(format!("transport error: {e}")),
                        None => return End::Lost(REASON_TRANSPORT_CLOSE.to_owned()),
                    };
                    let text = match msg {
                        WsMessage::Text(text) => text,
                        WsMessage::Close(_) => return End::Lost(REASON_TRANSPORT_CLOSE.to_owned()),
                        _ => continue,
                    };
                    deadline = Instant::now() + liveness;

                    match frames::decode_packet(&text) {
                        Ok(Packet::Ping) => {
                            if let Err(e) = send_packet(&mut sink, &Packet::Pong).await {
                                return End::Lost(format!("transport error: {e}"));
                            }
                        }
                        Ok(Packet::Message(SocketPacket::Event { name, args, .. })) => self.dispatch(&name, &args),
                        Ok(Packet::Message(SocketPacket::Disconnect { .. })) => return End::ServerDisconnect,
                        Ok(Packet::Close) => return End::Lost(REASON_TRANSPORT_CLOSE.to_owned()),
                        Ok(other) => debug!(packet = ?other, "transport: ignoring packet"),
                        Err(e) => warn!(error = %e, "transport: undecodable packet"),
                    }
                }
            }
        }
    }

    fn dispatch(&self, name: &str, args: &[Value]) {
        match TransportEvent::decode(name, args) {
            Ok(Some(event)) => self.publish(event),
            Ok(None) => debug!(event = name, "transport: unhandled event"),
            Err(e) => warn!(error = %e, "transport: dropping event"),
        }
    }

    fn publish(&self, event: TransportEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

// =============================================================================
// CONNECT
// =============================================================================

struct Connection {
    ws: WsStream,
    /// Silence longer than this means the server is gone.
    liveness: Duration,
}

/// Walk the transport preference list until one connects.
async fn connect(config: &TransportConfig, token: &str) -> Result<Connection, TransportError> {
    let mut last_error = None;

    for kind in &config.transports {
        match kind {
            TransportKind::WebSocket => {
                let attempt = tokio::time::timeout(config.handshake_timeout, handshake(&config.socket_url, token));
                match attempt.await {
                    Ok(Ok(conn)) => return Ok(conn),
                    Ok(Err(e @ TransportError::Rejected(_))) => return Err(e),
                    Ok(Err(e)) => last_error = Some(e),
                    Err(_) => last_error = Some(TransportError::HandshakeTimeout(config.handshake_timeout)),
                }
            }
            TransportKind::Polling => {
                warn!(transport = kind.as_str(), "transport: not supported, skipping");
            }
        }
    }

    Err(last_error.unwrap_or(TransportError::NoTransport))
}

async fn handshake(base_url: &str, token: &str) -> Result<Connection, TransportError> {
    let url = socket_io_url(base_url)?;
    let (mut ws, _) = connect_async(url.as_str()).await?;

    let open = match next_packet(&mut ws).await? {
        Packet::Open(open) => open,
        other => return Err(TransportError::Handshake(format!("expected open packet, got {other:?}"))),
    };

    let auth = serde_json::json!({ "token": token });
    send_packet(&mut ws, &Packet::Message(SocketPacket::connect(Some(auth)))).await?;

    loop {
        match next_packet(&mut ws).await? {
            Packet::Message(SocketPacket::Connect { data, .. }) => {
                let sid = data.as_ref().and_then(|d| d.get("sid")).and_then(Value::as_str).unwrap_or_default();
                info!(sid, engine_sid = %open.sid, "transport: connected");
                let liveness = Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout));
                return Ok(Connection { ws, liveness });
            }
            Packet::Message(SocketPacket::ConnectError { data, .. }) => {
                return Err(TransportError::Rejected(connect_error_message(&data)));
            }
            Packet::Ping => send_packet(&mut ws, &Packet::Pong).await?,
            Packet::Close => return Err(TransportError::Handshake("closed during handshake".to_owned())),
            _ => {}
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<Packet, TransportError> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => return Ok(frames::decode_packet(&text)?),
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(TransportError::Handshake("connection closed".to_owned()));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn send_packet<S>(sink: &mut S, packet: &Packet) -> Result<(), tungstenite::Error>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    sink.send(WsMessage::Text(frames::encode_packet(packet).into())).await
}

fn connect_error_message(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .or_else(|| data.as_str())
        .unwrap_or("connection refused")
        .to_owned()
}

/// Map an HTTP(S) base URL to the Engine.IO websocket endpoint.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] for schemes other than http(s)/ws(s).
pub fn socket_io_url(base_url: &str) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_owned()
    } else {
        return Err(TransportError::InvalidUrl(base_url.to_owned()));
    };
    Ok(format!("{rest}/socket.io/?EIO=4&transport=websocket"))
}

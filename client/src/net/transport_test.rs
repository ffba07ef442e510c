use super::*;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::{ReconnectPolicy, TransportConfig, TransportKind};

const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
const WAIT: Duration = Duration::from_secs(3);

fn config(socket_url: String) -> TransportConfig {
    TransportConfig {
        socket_url,
        transports: vec![TransportKind::WebSocket],
        reconnect: ReconnectPolicy {
            attempts: 2,
            delay: Duration::from_millis(10),
            delay_max: Duration::from_millis(20),
        },
        handshake_timeout: Duration::from_secs(2),
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

async fn send_text(ws: &mut WebSocketStream<TcpStream>, text: &str) {
    ws.send(WsMessage::Text(text.to_owned().into())).await.unwrap();
}

/// Next text frame, or `None` once the client goes away.
async fn recv_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            WsMessage::Text(text) => return Some(text.as_str().to_owned()),
            WsMessage::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Play the server half of the handshake; returns the client's connect frame.
async fn server_handshake(ws: &mut WebSocketStream<TcpStream>) -> String {
    send_text(ws, OPEN).await;
    let connect = recv_text(ws).await.unwrap();
    send_text(ws, r#"40{"sid":"sock-1"}"#).await;
    connect
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn wait_state(session: &TransportSession, want: ConnectionState) {
    let mut state = session.subscribe_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == want)).await.unwrap().unwrap();
}

// =============================================================================
// URL
// =============================================================================

#[test]
fn socket_io_url_maps_http_schemes() {
    assert_eq!(
        socket_io_url("http://localhost:5001").unwrap(),
        "ws://localhost:5001/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        socket_io_url("https://chat.example.com/").unwrap(),
        "wss://chat.example.com/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        socket_io_url("ws://127.0.0.1:9").unwrap(),
        "ws://127.0.0.1:9/socket.io/?EIO=4&transport=websocket"
    );
}

#[test]
fn socket_io_url_rejects_other_schemes() {
    assert!(matches!(socket_io_url("ftp://host"), Err(TransportError::InvalidUrl(_))));
    assert!(matches!(socket_io_url("localhost:5001"), Err(TransportError::InvalidUrl(_))));
}

// =============================================================================
// SESSION
// =============================================================================

#[tokio::test]
async fn new_session_is_idle_and_cannot_emit() {
    let (session, _events) = TransportSession::new(config("http://127.0.0.1:9".to_owned()));
    assert_eq!(session.state(), ConnectionState::Idle);
    assert!(!session.is_connected());
    assert!(!session.emit(OutboundEvent::StartTyping { receiver_id: "u2".to_owned() }));
}

#[tokio::test]
async fn close_without_open_is_a_noop() {
    let (mut session, _events) = TransportSession::new(config("http://127.0.0.1:9".to_owned()));
    session.close().await;
    assert_eq!(session.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn connects_relays_events_and_emits() {
    let (listener, url) = listen().await;
    let (received_tx, received_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let connect = server_handshake(&mut ws).await;
        send_text(&mut ws, r#"42["userOnline",{"userId":"u2"}]"#).await;
        let emitted = recv_text(&mut ws).await.unwrap();
        let _ = received_tx.send(emitted);
        let mut rest = Vec::new();
        while let Some(text) = recv_text(&mut ws).await {
            rest.push(text);
        }
        (connect, rest)
    });

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("tok-1").await;

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert!(session.is_connected());
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::PresenceChanged { user_id: "u2".to_owned(), online: true }
    );

    assert!(session.emit(OutboundEvent::StartTyping { receiver_id: "u2".to_owned() }));
    let emitted = tokio::time::timeout(WAIT, received_rx).await.unwrap().unwrap();
    assert_eq!(emitted, r#"42["startTyping",{"receiverId":"u2"}]"#);

    session.close().await;
    assert_eq!(session.state(), ConnectionState::Closed);
    assert!(!session.emit(OutboundEvent::StopTyping { receiver_id: "u2".to_owned() }));

    let (connect, rest) = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(connect, r#"40{"token":"tok-1"}"#);
    assert_eq!(rest, ["41"]);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn answers_server_ping_with_pong() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        server_handshake(&mut ws).await;
        send_text(&mut ws, "2").await;
        recv_text(&mut ws).await
    });

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("tok").await;
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    let pong = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(pong.as_deref(), Some("3"));
    session.close().await;
}

#[tokio::test]
async fn rejected_connect_is_terminal() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_text(&mut ws, OPEN).await;
        recv_text(&mut ws).await;
        send_text(&mut ws, r#"44{"message":"Authentication error"}"#).await;
        // A retry would show up as a second connection.
        tokio::time::timeout(Duration::from_millis(300), listener.accept()).await.is_err()
    });

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("bad").await;

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionError { reason: "Authentication error".to_owned() }
    );
    wait_state(&session, ConnectionState::Disconnected).await;
    assert_eq!(session.error_count(), 1);
    assert!(tokio::time::timeout(WAIT, server).await.unwrap().unwrap(), "client retried after rejection");
}

#[tokio::test]
async fn server_disconnect_is_terminal() {
    let (listener, url) = listen().await;
    let _server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        server_handshake(&mut ws).await;
        send_text(&mut ws, "41").await;
        recv_text(&mut ws).await;
    });

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("tok").await;

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected { reason: REASON_SERVER_DISCONNECT.to_owned() }
    );
    wait_state(&session, ConnectionState::Disconnected).await;
    assert!(!session.is_connected());
}

#[tokio::test]
async fn reconnects_after_transport_close() {
    let (listener, url) = listen().await;
    let _server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        server_handshake(&mut first).await;
        first.close(None).await.unwrap();

        let mut second = accept(&listener).await;
        server_handshake(&mut second).await;
        recv_text(&mut second).await;
    });

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("tok").await;

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected { reason: REASON_TRANSPORT_CLOSE.to_owned() }
    );
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert!(session.is_connected());
    assert_eq!(session.error_count(), 0);
    session.close().await;
}

#[tokio::test]
async fn reopen_tears_down_prior_session() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        let first_connect = server_handshake(&mut first).await;
        let mut first_rest = Vec::new();
        while let Some(text) = recv_text(&mut first).await {
            first_rest.push(text);
        }

        let mut second = accept(&listener).await;
        let second_connect = server_handshake(&mut second).await;
        send_text(&mut second, r#"42["userOnline",{"userId":"u2"}]"#).await;
        recv_text(&mut second).await;
        (first_connect, first_rest, second_connect)
    });

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("tok-a").await;
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    session.open("tok-b").await;
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::PresenceChanged { user_id: "u2".to_owned(), online: true }
    );
    assert!(session.is_connected());

    session.close().await;
    let (first_connect, first_rest, second_connect) = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(first_connect, r#"40{"token":"tok-a"}"#);
    assert_eq!(first_rest, ["41"]);
    assert_eq!(second_connect, r#"40{"token":"tok-b"}"#);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn gives_up_after_configured_attempts() {
    let (listener, url) = listen().await;
    drop(listener);

    let (mut session, mut events) = TransportSession::new(config(url));
    session.open("tok").await;

    for _ in 0..3 {
        assert!(matches!(next_event(&mut events).await, TransportEvent::ConnectionError { .. }));
    }
    wait_state(&session, ConnectionState::Disconnected).await;
    assert_eq!(session.error_count(), 3);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn skips_unsupported_transports() {
    let (listener, url) = listen().await;
    let _server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        server_handshake(&mut ws).await;
        recv_text(&mut ws).await;
    });

    let mut cfg = config(url);
    cfg.transports = vec![TransportKind::Polling, TransportKind::WebSocket];
    let (mut session, mut events) = TransportSession::new(cfg);
    session.open("tok").await;

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    session.close().await;
}

#[tokio::test]
async fn polling_only_never_connects() {
    let mut cfg = config("http://127.0.0.1:9".to_owned());
    cfg.transports = vec![TransportKind::Polling];
    cfg.reconnect.attempts = 0;
    let (mut session, mut events) = TransportSession::new(cfg);
    session.open("tok").await;

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionError { reason: TransportError::NoTransport.to_string() }
    );
    wait_state(&session, ConnectionState::Disconnected).await;
}

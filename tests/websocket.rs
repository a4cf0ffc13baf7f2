//! End-to-end tests against a local `tokio-tungstenite` server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use panel_socket::{BackoffPolicy, ConnectionState, EventName, Socket, SocketEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

// ============================================================================
// Test Server
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

const ORIGIN: &str = "https://panel.example.com";

type ServerSocket = WebSocketStream<TcpStream>;

struct TestServer {
    url: String,
    connections: UnboundedReceiver<ServerSocket>,
    origins: UnboundedReceiver<Option<String>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}/api/servers/1/ws", listener.local_addr().expect("addr"));

        let (conn_tx, connections) = mpsc::unbounded_channel();
        let (origin_tx, origins) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let origin_tx = origin_tx.clone();
                let callback = move |req: &Request, resp: Response| {
                    let origin = req
                        .headers()
                        .get("origin")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let _ = origin_tx.send(origin);
                    Ok::<_, ErrorResponse>(resp)
                };

                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(tcp, callback).await {
                    let _ = conn_tx.send(ws);
                }
            }
        });

        Self {
            url,
            connections,
            origins,
        }
    }

    async fn accept(&mut self) -> ServerSocket {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for connection")
            .expect("server stopped")
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_policy() -> BackoffPolicy {
    BackoffPolicy::new(
        Duration::from_millis(500),
        Duration::from_millis(100),
        Duration::from_secs(1),
    )
}

fn socket() -> Socket {
    Socket::builder()
        .backoff(fast_policy())
        .origin(ORIGIN)
        .build()
        .expect("build socket")
}

async fn next_text(ws: &mut ServerSocket) -> String {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("client went away")
            .expect("read frame");

        if let Message::Text(text) = message {
            return text.to_string();
        }
    }
}

async fn wait_for(events: &mut UnboundedReceiver<SocketEvent>, name: EventName) -> SocketEvent {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream ended");

        if event.name() == name {
            return event;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_authenticates_and_exchanges_envelopes() {
    let mut server = TestServer::start().await;
    let socket = socket();
    let mut events = socket.listen();

    socket.set_token("T1", false).connect(server.url.clone()).expect("connect");

    let mut ws = server.accept().await;
    assert_eq!(server.origins.recv().await.flatten().as_deref(), Some(ORIGIN));
    assert_eq!(next_text(&mut ws).await, r#"{"event":"auth","args":["T1"]}"#);
    wait_for(&mut events, EventName::Open).await;

    ws.send(Message::Text(r#"{"event":"status","args":["starting"]}"#.into()))
        .await
        .expect("send status");
    let event = wait_for(&mut events, EventName::server("status")).await;
    assert_eq!(event.args(), ["starting".to_owned()]);

    socket.send("set state", "restart");
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"event":"set state","args":["restart"]}"#
    );
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let mut server = TestServer::start().await;
    let socket = socket();
    let mut events = socket.listen();

    socket.set_token("T1", false).connect(server.url.clone()).expect("connect");

    let mut first = server.accept().await;
    next_text(&mut first).await;
    wait_for(&mut events, EventName::Open).await;

    first.close(None).await.expect("close");
    wait_for(&mut events, EventName::Close).await;
    wait_for(&mut events, EventName::Reconnect).await;

    let mut second = server.accept().await;
    assert_eq!(next_text(&mut second).await, r#"{"event":"auth","args":["T1"]}"#);
    wait_for(&mut events, EventName::Open).await;

    let status = socket.status().await.expect("status");
    assert_eq!(status.state, ConnectionState::Open);
    assert_eq!(status.attempts, 2);
}

#[tokio::test]
async fn test_close_sends_close_frame() {
    let mut server = TestServer::start().await;
    let socket = socket();
    let mut events = socket.listen();

    socket.connect(server.url.clone()).expect("connect");
    let mut ws = server.accept().await;
    wait_for(&mut events, EventName::Open).await;

    socket.close(Some(4100), Some("done"));

    let frame = loop {
        match timeout(WAIT, ws.next()).await.expect("timed out") {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    let frame = frame.expect("close frame payload");
    assert_eq!(u16::from(frame.code), 4100);
    assert_eq!(frame.reason.as_str(), "done");
}

#[tokio::test]
async fn test_refused_connection_reports_error_and_retries() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr")
    };

    let socket = socket();
    let mut events = socket.listen();
    socket.connect(format!("ws://{addr}/ws")).expect("connect");

    let event = wait_for(&mut events, EventName::Error).await;
    assert!(event.error().is_some_and(|e| e.is_connection_error()), "{event:?}");
    wait_for(&mut events, EventName::Reconnect).await;

    socket.close(None, None);
}

//! Shared test utilities: a scripted in-memory connector.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{sink, stream};
use panel_socket::{Connector, Error, FrameSink, FrameStream, Result, SocketEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

// ============================================================================
// Constants
// ============================================================================

pub const URL: &str = "wss://node.example.com/api/servers/1/ws";

/// Allowed drift when comparing virtual timestamps.
pub const TOLERANCE_MS: u64 = 5;

/// Upper bound for any single wait in virtual time.
const WAIT_LIMIT: Duration = Duration::from_secs(600);

// ============================================================================
// Plan
// ============================================================================

/// Outcome of one `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Refuse immediately.
    Fail,
    /// Open and hand a [`MockPeer`] to the test.
    Open,
    /// Never complete.
    Hang,
}

// ============================================================================
// MockConnector
// ============================================================================

struct State {
    script: VecDeque<Plan>,
    connects: Vec<Instant>,
    peers: UnboundedSender<MockPeer>,
}

/// Connector that follows a script and then refuses.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<State>>,
    started: Instant,
}

impl MockConnector {
    /// Creates a connector and the receiver of opened peers.
    pub fn new(script: impl IntoIterator<Item = Plan>) -> (Self, UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let state = State {
            script: script.into_iter().collect(),
            connects: Vec::new(),
            peers,
        };

        let connector = Self {
            state: Arc::new(Mutex::new(state)),
            started: Instant::now(),
        };
        (connector, peers_rx)
    }

    /// Creates a connector that refuses every attempt.
    pub fn refusing() -> (Self, UnboundedReceiver<MockPeer>) {
        Self::new(Vec::<Plan>::new())
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> usize {
        self.state.lock().connects.len()
    }

    /// Milliseconds since creation for every `connect` call.
    pub fn connect_times(&self) -> Vec<u64> {
        self.state
            .lock()
            .connects
            .iter()
            .map(|at| millis(at.duration_since(self.started)))
            .collect()
    }

    /// Milliseconds since creation.
    pub fn elapsed(&self) -> u64 {
        millis(self.started.elapsed())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &Url) -> Result<(FrameSink, FrameStream)> {
        let plan = {
            let mut state = self.state.lock();
            state.connects.push(Instant::now());
            state.script.pop_front().unwrap_or(Plan::Fail)
        };

        match plan {
            Plan::Fail => Err(Error::connection("connection refused")),
            Plan::Hang => std::future::pending().await,
            Plan::Open => {
                let (peer, sink, stream) = MockPeer::pair();
                let _ = self.state.lock().peers.send(peer);
                Ok((sink, stream))
            }
        }
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// Server side of an opened mock transport.
///
/// Dropping the peer ends the client's stream.
pub struct MockPeer {
    inbound: UnboundedReceiver<Message>,
    outbound: UnboundedSender<std::result::Result<Message, WsError>>,
}

impl MockPeer {
    fn pair() -> (Self, FrameSink, FrameStream) {
        let (to_peer, inbound) = mpsc::unbounded_channel::<Message>();
        let (outbound, mut from_peer) =
            mpsc::unbounded_channel::<std::result::Result<Message, WsError>>();

        let sink = sink::unfold(to_peer, |tx, message: Message| async move {
            tx.send(message).map_err(|_| WsError::ConnectionClosed)?;
            Ok::<_, WsError>(tx)
        });
        let stream = stream::poll_fn(move |cx| from_peer.poll_recv(cx));

        (Self { inbound, outbound }, Box::pin(sink), Box::pin(stream))
    }

    /// Next frame written by the client.
    pub async fn recv(&mut self) -> Option<Message> {
        timeout(WAIT_LIMIT, self.inbound.recv()).await.ok().flatten()
    }

    /// Next frame written by the client, which must be text.
    pub async fn next_text(&mut self) -> String {
        match self.recv().await {
            Some(Message::Text(text)) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    /// Next frame written by the client, which must be a close frame.
    pub async fn next_close_code(&mut self) -> u16 {
        match self.recv().await {
            Some(Message::Close(Some(frame))) => u16::from(frame.code),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    /// Close code of a close frame already written by the client.
    pub fn written_close_code(&mut self) -> Option<u16> {
        match self.inbound.try_recv() {
            Ok(Message::Close(Some(frame))) => Some(u16::from(frame.code)),
            _ => None,
        }
    }

    /// Returns `true` if the client wrote nothing more so far.
    pub fn is_quiet(&mut self) -> bool {
        self.inbound.try_recv().is_err()
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.outbound.send(Ok(Message::Text(text.into())));
    }

    pub fn push_close(&self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let _ = self.outbound.send(Ok(Message::Close(Some(frame))));
    }

    pub fn push_error(&self) {
        let _ = self.outbound.send(Err(WsError::ConnectionClosed));
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Awaits the next event.
pub async fn next_event(events: &mut UnboundedReceiver<SocketEvent>) -> SocketEvent {
    timeout(WAIT_LIMIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream ended")
}

/// Lets every spawned task run to quiescence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Asserts `actual` is within [`TOLERANCE_MS`] of `expected`.
#[track_caller]
pub fn assert_near(actual: u64, expected: u64) {
    assert!(
        actual.abs_diff(expected) <= TOLERANCE_MS,
        "expected ~{expected}ms, got {actual}ms"
    );
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

//! Per-attempt transport task.
//!
//! Every attempt spawns one tokio task that dials through the
//! [`Connector`], then pumps frames in both directions until the transport
//! ends. The task reports back to the dispatcher with [`Signal`]s tagged by
//! [`AttemptId`], and receives outgoing frames through its
//! [`TransportHandle`].
//!
//! # Event Loop
//!
//! - Incoming text frames are forwarded undecoded
//! - Outgoing text frames are written in submission order
//! - A requested close sends a close frame with the given code and exits
//! - Exactly one terminal signal (`Failed` or `Closed`) is sent per task,
//!   unless the dispatcher itself tore the transport down

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::identifiers::AttemptId;

use super::connector::{Connector, FrameSink};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for flushing a close frame before the task gives up.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Signal
// ============================================================================

/// Report from a transport task to the dispatcher.
#[derive(Debug)]
pub(crate) enum Signal {
    /// The transport reached the open state.
    Opened { attempt: AttemptId },
    /// A text frame arrived.
    Frame { attempt: AttemptId, text: String },
    /// Dialing or the open transport failed.
    Failed { attempt: AttemptId, error: Error },
    /// The remote closed the transport or the stream ended.
    Closed {
        attempt: AttemptId,
        code: Option<u16>,
        reason: String,
    },
}

impl Signal {
    /// Returns the attempt this signal belongs to.
    #[inline]
    pub(crate) const fn attempt(&self) -> AttemptId {
        match self {
            Self::Opened { attempt }
            | Self::Frame { attempt, .. }
            | Self::Failed { attempt, .. }
            | Self::Closed { attempt, .. } => *attempt,
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Instructions from the dispatcher to a transport task.
#[derive(Debug)]
enum Outbound {
    /// Write a text frame.
    Text(String),
    /// Send a close frame, notify `done`, and exit.
    Close {
        code: u16,
        reason: String,
        done: Option<oneshot::Sender<()>>,
    },
}

// ============================================================================
// TransportHandle
// ============================================================================

/// Dispatcher-owned handle to one transport attempt.
///
/// Dropping the handle tears the transport down: a task still dialing is
/// aborted, an open one sees its outbound channel close and shuts the
/// socket.
#[derive(Debug)]
pub(crate) struct TransportHandle {
    /// Attempt this transport belongs to.
    attempt: AttemptId,
    /// Outgoing frames for the task.
    outbound: mpsc::UnboundedSender<Outbound>,
    /// The transport task.
    task: JoinHandle<()>,
    /// Set once the dispatcher has processed `Signal::Opened`.
    open: bool,
}

impl TransportHandle {
    /// Spawns the transport task for `attempt`.
    pub(crate) fn spawn(
        connector: Arc<dyn Connector>,
        url: Url,
        attempt: AttemptId,
        signals: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_transport(connector, url, attempt, signals, outbound_rx));

        Self {
            attempt,
            outbound,
            task,
            open: false,
        }
    }

    /// Returns the attempt this transport belongs to.
    #[inline]
    pub(crate) const fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Returns `true` once the transport has opened.
    #[inline]
    pub(crate) const fn is_open(&self) -> bool {
        self.open
    }

    /// Marks the transport as open.
    #[inline]
    pub(crate) fn mark_open(&mut self) {
        self.open = true;
    }

    /// Queues a text frame. Returns `false` if the task is gone.
    pub(crate) fn send_text(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Closes the transport with `code` and `reason`.
    ///
    /// An open transport sends a close frame; a dialing one is aborted.
    pub(crate) fn close(self, code: u16, reason: &str) {
        self.close_notify(code, reason, None);
    }

    /// Closes the transport and resolves `done` once the close frame is
    /// flushed. `done` is dropped at once if the transport never opened.
    pub(crate) fn close_notify(self, code: u16, reason: &str, done: Option<oneshot::Sender<()>>) {
        debug!(attempt = %self.attempt, code, reason, open = self.open, "Closing transport");

        if self.open {
            let _ = self.outbound.send(Outbound::Close {
                code,
                reason: reason.to_owned(),
                done,
            });
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if !self.open {
            self.task.abort();
        }
    }
}

// ============================================================================
// Transport Task
// ============================================================================

/// Dials and then pumps frames until the transport ends.
async fn run_transport(
    connector: Arc<dyn Connector>,
    url: Url,
    attempt: AttemptId,
    signals: mpsc::UnboundedSender<Signal>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let (mut sink, mut stream) = match connector.connect(&url).await {
        Ok(halves) => halves,
        Err(error) => {
            let _ = signals.send(Signal::Failed { attempt, error });
            return;
        }
    };

    if signals.send(Signal::Opened { attempt }).is_err() {
        return;
    }

    loop {
        tokio::select! {
            // Incoming frames from the server
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(%attempt, len = text.len(), "Frame received");
                        let _ = signals.send(Signal::Frame { attempt, text: text.to_string() });
                    }

                    Some(Ok(Message::Binary(data))) => {
                        warn!(%attempt, len = data.len(), "Dropping binary frame");
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or_default();
                        debug!(%attempt, ?code, %reason, "WebSocket closed by remote");
                        let _ = signals.send(Signal::Closed { attempt, code, reason });
                        break;
                    }

                    Some(Err(e)) => {
                        let _ = signals.send(Signal::Failed { attempt, error: e.into() });
                        break;
                    }

                    None => {
                        debug!(%attempt, "WebSocket stream ended");
                        let _ = signals.send(Signal::Closed { attempt, code: None, reason: String::new() });
                        break;
                    }

                    // Ping/Pong are answered by tungstenite
                    _ => {}
                }
            }

            // Frames from the dispatcher
            command = outbound.recv() => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            let _ = signals.send(Signal::Failed { attempt, error: e.into() });
                            break;
                        }
                        trace!(%attempt, "Frame sent");
                    }

                    Some(Outbound::Close { code, reason, done }) => {
                        send_close(&mut sink, code, reason).await;
                        if let Some(done) = done {
                            let _ = done.send(());
                        }
                        break;
                    }

                    None => {
                        let _ = timeout(CLOSE_FLUSH_TIMEOUT, sink.close()).await;
                        break;
                    }
                }
            }
        }
    }

    drop(stream);
    debug!(%attempt, "Transport task terminated");
}

/// Writes a close frame, bounded by [`CLOSE_FLUSH_TIMEOUT`].
async fn send_close(sink: &mut FrameSink, code: u16, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };

    match timeout(CLOSE_FLUSH_TIMEOUT, sink.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
        Err(_) => debug!("Close frame flush timed out"),
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Socket handle and connection-lifecycle dispatcher.
//!
//! [`Socket`] is a cheap, cloneable handle. Every operation is a command
//! pushed onto an unbounded channel; a single dispatcher task owns all
//! connection state and processes commands, transport signals and timer
//! expiries one at a time.
//!
//! # Lifecycle
//!
//! ```text
//!            connect()                 opened
//!   Idle ───────────────► Connecting ──────────► Open
//!                          ▲      │                 │
//!          retry timer     │      │ failure /       │ error / remote close
//!                          │      ▼ watchdog        ▼
//!                         Reconnecting ◄────────────┘
//!
//!   close() from any state ──► Closed   (no retries until connect())
//! ```
//!
//! # Timers
//!
//! Two [`TimerSlot`]s exist: the watchdog (armed per attempt with the
//! current backoff, cancelled on open, failure, close or a new attempt) and
//! the retry timer (armed per failure, cancelled on close or a new attempt).
//! Each holds at most one deadline.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{AttemptId, SubscriptionId};
use crate::protocol::{Envelope, EventName, Payload, SocketEvent};
use crate::transport::{Connector, Signal, TransportHandle};

use super::backoff::{Backoff, BackoffPolicy};
use super::builder::SocketBuilder;
use super::subscribers::Subscribers;
use super::timer::TimerSlot;

// ============================================================================
// Close Codes
// ============================================================================

/// Close code used by `close()` without an explicit code.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when the watchdog aborts an attempt.
pub const CLOSE_OPEN_TIMEOUT: u16 = 4000;

/// Close code sent by `reconnect()`.
pub const CLOSE_MANUAL_RECONNECT: u16 = 4001;

/// Close code sent when a new attempt replaces a live transport.
pub const CLOSE_SUPERSEDED: u16 = 4002;

// ============================================================================
// ConnectionState
// ============================================================================

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// A transport is dialing; the watchdog is armed.
    Connecting,
    /// The transport is open.
    Open,
    /// No transport; a retry is scheduled.
    Reconnecting,
    /// Closed by the owner, or no retry is pending.
    Closed,
}

// ============================================================================
// Status
// ============================================================================

/// Snapshot of the dispatcher state.
#[derive(Debug, Clone)]
pub struct Status {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Target endpoint, `None` when never connected or closed.
    pub url: Option<String>,
    /// Whether a token is stored.
    pub has_token: bool,
    /// Current retry delay.
    pub backoff: Duration,
    /// Whether `close()` suppressed reconnects.
    pub manually_closed: bool,
    /// Whether the open-attempt watchdog is armed.
    pub watchdog_armed: bool,
    /// Whether a retry is scheduled.
    pub retry_pending: bool,
    /// Number of transport attempts made so far.
    pub attempts: u64,
}

// ============================================================================
// Command
// ============================================================================

/// Operations sent from handles to the dispatcher.
#[derive(Debug)]
enum Command {
    Connect(String),
    SetToken { token: String, is_update: bool },
    Authenticate,
    Send(Envelope),
    Reconnect,
    Open,
    Close {
        code: Option<u16>,
        reason: Option<String>,
        done: Option<oneshot::Sender<()>>,
    },
    Status(oneshot::Sender<Status>),
}

// ============================================================================
// Socket
// ============================================================================

/// Handle to a self-reconnecting, authenticated WebSocket.
///
/// # Thread Safety
///
/// `Socket` is `Send + Sync` and cheap to clone. All operations are
/// non-blocking. The dispatcher stops once every `Socket` is dropped.
///
/// Handlers registered with [`Socket::on`] are owned by the dispatcher, so a
/// handler that captures a `Socket` keeps it alive forever. Capture a
/// [`WeakSocket`] from [`Socket::downgrade`] instead.
///
/// # Example
///
/// ```no_run
/// use panel_socket::{EventName, Socket};
///
/// # async fn example() -> panel_socket::Result<()> {
/// let socket = Socket::builder().build()?;
///
/// socket.on(EventName::Open, |_| println!("connected"));
/// socket.on("status", |event| println!("status: {:?}", event.args()));
///
/// socket.set_token("jwt", false).connect("wss://node.example.com/api/servers/1/ws")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

/// State shared by every clone of a [`Socket`].
struct SocketInner {
    /// Channel to the dispatcher. Dropped with the last handle.
    commands: mpsc::UnboundedSender<Command>,
    /// Subscriber registry (shared with the dispatcher).
    subscribers: Arc<Subscribers>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Socket {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SocketBuilder {
        SocketBuilder::new()
    }

    /// Spawns the dispatcher on `runtime`.
    pub(crate) fn spawn(
        runtime: &Handle,
        connector: Arc<dyn Connector>,
        policy: BackoffPolicy,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let subscribers = Arc::new(Subscribers::default());

        let dispatcher = Dispatcher {
            connector,
            commands: command_rx,
            signals_tx,
            signals,
            subscribers: Arc::clone(&subscribers),
            url: None,
            token: String::new(),
            transport: None,
            watchdog: TimerSlot::new("watchdog"),
            retry: TimerSlot::new("retry"),
            backoff: Backoff::new(policy),
            manually_closed: false,
            last_attempt: AttemptId::default(),
        };

        runtime.spawn(dispatcher.run());

        Self {
            inner: Arc::new(SocketInner {
                commands,
                subscribers,
            }),
        }
    }

    /// Creates a handle that does not keep the dispatcher alive.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakSocket {
        WeakSocket {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Connects to `url`, restarting any attempt in progress.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `url` is empty
    /// - [`Error::ConnectionClosed`] if the dispatcher has stopped
    pub fn connect(&self, url: impl Into<String>) -> Result<&Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::invalid_argument("connect called with empty URL"));
        }

        self.inner
            .commands
            .send(Command::Connect(url))
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(self)
    }

    /// Stores the authentication token.
    ///
    /// With `is_update`, the token is sent immediately on the open
    /// transport without reconnecting.
    pub fn set_token(&self, token: impl Into<String>, is_update: bool) -> &Self {
        self.command(Command::SetToken {
            token: token.into(),
            is_update,
        });
        self
    }

    /// Sends the `auth` envelope with the stored token.
    ///
    /// No-op without a URL, a token, or an open transport.
    pub fn authenticate(&self) {
        self.command(Command::Authenticate);
    }

    /// Sends `event` with `payload`. No-op unless the transport is open.
    pub fn send(&self, event: impl Into<String>, payload: impl Into<Payload>) {
        self.command(Command::Send(Envelope::new(event, payload)));
    }

    /// Drops the current transport and opens a new one immediately.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Opens a transport unless one is open or no URL is set.
    pub fn open(&self) {
        self.command(Command::Open);
    }

    /// Closes the socket permanently until the next [`Socket::connect`].
    ///
    /// Clears the URL and token and cancels every pending timer.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.command(Command::Close {
            code,
            reason: reason.map(str::to_owned),
            done: None,
        });
    }

    /// Like [`Socket::close`], but resolves once the close frame has been
    /// written (or the flush timed out).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the dispatcher has stopped
    pub async fn shutdown(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Close {
                code,
                reason: reason.map(str::to_owned),
                done: Some(tx),
            })
            .map_err(|_| Error::ConnectionClosed)?;

        // A dropped sender means there was no open transport to flush.
        let _ = rx.await;
        Ok(())
    }

    /// Registers `handler` for events named `name`.
    pub fn on<F>(&self, name: impl Into<EventName>, handler: F) -> SubscriptionId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.inner.subscribers.add(name.into(), Arc::new(handler))
    }

    /// Removes a handler. Returns `true` if it was registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.remove(id)
    }

    /// Removes every handler for `name`. Returns how many were removed.
    pub fn off_all(&self, name: impl Into<EventName>) -> usize {
        self.inner.subscribers.remove_all(&name.into())
    }

    /// Returns a receiver of every event emitted from now on.
    #[must_use]
    pub fn listen(&self) -> mpsc::UnboundedReceiver<SocketEvent> {
        self.inner.subscribers.listen()
    }

    /// Returns a snapshot of the dispatcher state.
    ///
    /// The snapshot reflects every command sent before this call.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the dispatcher has stopped
    pub async fn status(&self) -> Result<Status> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Status(tx))
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(rx.await?)
    }

    /// Returns `true` while the dispatcher task is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.commands.is_closed()
    }

    fn command(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!("Dispatcher stopped, command dropped");
        }
    }
}

// ============================================================================
// WeakSocket
// ============================================================================

/// Non-owning [`Socket`] handle.
///
/// # Example
///
/// ```no_run
/// use panel_socket::Socket;
///
/// # fn example(socket: &Socket) {
/// let handle = socket.downgrade();
/// socket.on("token expiring", move |_| {
///     if let Some(socket) = handle.upgrade() {
///         socket.authenticate();
///     }
/// });
/// # }
/// ```
#[derive(Clone)]
pub struct WeakSocket {
    inner: Weak<SocketInner>,
}

impl WeakSocket {
    /// Returns the socket if any owning handle is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Socket> {
        self.inner.upgrade().map(|inner| Socket { inner })
    }
}

impl fmt::Debug for WeakSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSocket")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Exclusive owner of all connection state.
struct Dispatcher {
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    signals_tx: mpsc::UnboundedSender<Signal>,
    signals: mpsc::UnboundedReceiver<Signal>,
    subscribers: Arc<Subscribers>,
    url: Option<String>,
    token: String,
    transport: Option<TransportHandle>,
    watchdog: TimerSlot,
    retry: TimerSlot,
    backoff: Backoff,
    manually_closed: bool,
    last_attempt: AttemptId,
}

impl Dispatcher {
    /// Processes commands, signals and timers until every handle is dropped.
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("All socket handles dropped");
                            break;
                        }
                    }
                }

                Some(signal) = self.signals.recv() => self.handle_signal(signal),

                () = self.watchdog.fired() => self.on_watchdog(),

                () = self.retry.fired() => self.on_retry_due(),
            }
        }

        self.watchdog.cancel();
        self.retry.cancel();
        self.teardown(CLOSE_NORMAL, "");
        debug!("Dispatcher terminated");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(url) => self.connect(url),
            Command::SetToken { token, is_update } => self.set_token(token, is_update),
            Command::Authenticate => self.authenticate(),
            Command::Send(envelope) => self.send(&envelope),
            Command::Reconnect => self.reconnect(),
            Command::Open => self.open(),
            Command::Close { code, reason, done } => {
                self.close(
                    code.unwrap_or(CLOSE_NORMAL),
                    reason.as_deref().unwrap_or_default(),
                    done,
                );
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn connect(&mut self, url: String) {
        debug!(url = %url, "Connect requested");
        self.manually_closed = false;
        self.url = Some(url);
        self.open_attempt();
    }

    fn set_token(&mut self, token: String, is_update: bool) {
        self.token = token;

        if is_update {
            debug!("Token updated, re-authenticating");
            self.authenticate();
        }
    }

    fn authenticate(&mut self) {
        if self.url.is_none() || self.token.is_empty() {
            trace!("Skipping authentication: no url or token");
            return;
        }

        let envelope = Envelope::auth(self.token.clone());
        self.send(&envelope);
    }

    fn send(&mut self, envelope: &Envelope) {
        let Some(transport) = self.transport.as_ref().filter(|t| t.is_open()) else {
            trace!(event = %envelope.event, "Transport not open, dropping send");
            return;
        };

        match envelope.encode() {
            Ok(text) => {
                if transport.send_text(text) {
                    trace!(event = %envelope.event, "Envelope queued");
                } else {
                    debug!(event = %envelope.event, "Transport task gone, dropping send");
                }
            }
            Err(e) => error!(event = %envelope.event, error = %e, "Failed to encode envelope"),
        }
    }

    fn reconnect(&mut self) {
        if self.url.is_none() {
            return;
        }

        info!("Manual reconnect requested");
        self.manually_closed = false;
        self.emit(SocketEvent::ReconnectRequested);

        if self.teardown(CLOSE_MANUAL_RECONNECT, "Manual reconnect") {
            self.emit(SocketEvent::Close);
        }

        self.open_attempt();
    }

    fn open(&mut self) {
        let is_open = self.transport.as_ref().is_some_and(TransportHandle::is_open);
        if is_open || self.url.is_none() {
            return;
        }

        self.manually_closed = false;
        self.open_attempt();
    }

    fn close(&mut self, code: u16, reason: &str, done: Option<oneshot::Sender<()>>) {
        info!(code, reason, "Socket closed by owner");

        self.manually_closed = true;
        self.url = None;
        self.token.clear();
        self.watchdog.cancel();
        self.retry.cancel();

        let was_open = self.transport.take().is_some_and(|transport| {
            let open = transport.is_open();
            transport.close_notify(code, reason, done);
            open
        });

        if was_open {
            self.emit(SocketEvent::Close);
        }
    }

    fn status(&self) -> Status {
        Status {
            state: self.state(),
            url: self.url.clone(),
            has_token: !self.token.is_empty(),
            backoff: self.backoff.current(),
            manually_closed: self.manually_closed,
            watchdog_armed: self.watchdog.is_armed(),
            retry_pending: self.retry.is_armed(),
            attempts: self.last_attempt.as_u64(),
        }
    }

    fn state(&self) -> ConnectionState {
        match (&self.transport, &self.url) {
            (Some(transport), _) if transport.is_open() => ConnectionState::Open,
            (Some(_), _) => ConnectionState::Connecting,
            (None, Some(_)) if self.retry.is_armed() => ConnectionState::Reconnecting,
            (None, None) if !self.manually_closed => ConnectionState::Idle,
            (None, _) => ConnectionState::Closed,
        }
    }

    // ------------------------------------------------------------------------
    // Attempts
    // ------------------------------------------------------------------------

    /// Starts a fresh attempt against the stored URL.
    fn open_attempt(&mut self) {
        let Some(raw_url) = self.url.clone() else {
            return;
        };

        self.watchdog.cancel();
        self.retry.cancel();

        if self.teardown(CLOSE_SUPERSEDED, "Superseded by new attempt") {
            self.emit(SocketEvent::Close);
        }

        let attempt = self.last_attempt.next();
        self.last_attempt = attempt;

        let url = match Url::parse(&raw_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(%attempt, url = %raw_url, error = %e, "Cannot build transport");
                self.emit(SocketEvent::Error(Arc::new(e.into())));
                self.schedule_retry();
                return;
            }
        };

        let timeout = self.backoff.current();
        debug!(%attempt, url = %url, timeout_ms = timeout.as_millis() as u64, "Opening transport");

        self.transport = Some(TransportHandle::spawn(
            Arc::clone(&self.connector),
            url,
            attempt,
            self.signals_tx.clone(),
        ));
        self.watchdog.arm(timeout);
    }

    /// Arms the retry timer with the current delay, then grows the delay.
    fn schedule_retry(&mut self) {
        if self.manually_closed || self.url.is_none() {
            return;
        }

        let delay = self.backoff.current();
        self.retry.arm(delay);
        let next = self.backoff.advance();

        debug!(
            delay_ms = delay.as_millis() as u64,
            backoff_ms = next.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    /// Drops the current transport. Returns `true` if it was open.
    fn teardown(&mut self, code: u16, reason: &str) -> bool {
        match self.transport.take() {
            Some(transport) => {
                let was_open = transport.is_open();
                transport.close(code, reason);
                was_open
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    fn handle_signal(&mut self, signal: Signal) {
        let current = self.transport.as_ref().map(TransportHandle::attempt);
        if current != Some(signal.attempt()) {
            trace!(attempt = %signal.attempt(), "Ignoring signal from stale transport");
            return;
        }

        match signal {
            Signal::Opened { attempt } => self.on_open(attempt),
            Signal::Frame { text, .. } => self.on_frame(&text),
            Signal::Failed { attempt, error } => self.on_failure(attempt, error),
            Signal::Closed {
                attempt,
                code,
                reason,
            } => self.on_remote_close(attempt, code, &reason),
        }
    }

    fn on_open(&mut self, attempt: AttemptId) {
        self.watchdog.cancel();
        if let Some(transport) = self.transport.as_mut() {
            transport.mark_open();
        }
        self.backoff.reset();

        info!(%attempt, "WebSocket connection established");
        self.emit(SocketEvent::Open);
        self.authenticate();
    }

    fn on_frame(&mut self, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => {
                trace!(event = %envelope.event, args = envelope.args.len(), "Envelope received");
                self.emit(SocketEvent::Server(envelope));
            }
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }

    fn on_failure(&mut self, attempt: AttemptId, error: Error) {
        self.watchdog.cancel();
        let was_open = self.transport.take().is_some_and(|t| t.is_open());

        error!(%attempt, error = %error, "WebSocket error");
        self.emit(SocketEvent::Error(Arc::new(error)));

        if was_open {
            self.emit(SocketEvent::Close);
        }

        self.schedule_retry();
    }

    fn on_remote_close(&mut self, attempt: AttemptId, code: Option<u16>, reason: &str) {
        self.watchdog.cancel();
        self.transport = None;

        info!(%attempt, ?code, reason, "WebSocket connection closed");
        self.emit(SocketEvent::Close);
        self.schedule_retry();
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn on_watchdog(&mut self) {
        let timeout = self.backoff.current();
        warn!(
            attempt = %self.last_attempt,
            timeout_ms = timeout.as_millis() as u64,
            "Transport did not open in time"
        );

        self.teardown(CLOSE_OPEN_TIMEOUT, "Connection timeout before open");
        self.emit(SocketEvent::Error(Arc::new(Error::connection_timeout(
            timeout.as_millis() as u64,
        ))));
        self.schedule_retry();
    }

    fn on_retry_due(&mut self) {
        if self.manually_closed || self.url.is_none() {
            return;
        }

        info!(attempt = %self.last_attempt.next(), "Attempting to reconnect");
        self.emit(SocketEvent::Reconnect);
        self.open_attempt();
    }

    fn emit(&self, event: SocketEvent) {
        self.subscribers.dispatch(&event);
    }
}

// ============================================================================
// Tests
// ============================================================================

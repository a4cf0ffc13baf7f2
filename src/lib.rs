//! Panel Socket - self-healing, authenticated WebSocket client.
//!
//! This library keeps one persistent WebSocket to a game-panel control
//! server (Pterodactyl / Wings style) alive, authenticates it with a JWT on
//! every open, and exposes the server's pushed messages as typed events.
//!
//! # Architecture
//!
//! - **Handle**: [`Socket`] is cloneable; every operation is a non-blocking command
//! - **Dispatcher**: one tokio task owns all connection state and timers
//! - **Transport**: one task per attempt dials and pumps frames
//! - **Events**: subscribers register by [`EventName`]; server events pass through verbatim
//!
//! Key guarantees:
//!
//! - At most one transport and at most one watchdog/retry timer are live
//! - Retry delay grows 5s, 7.5s, ... up to 20s and resets on every open
//! - `auth` is sent exactly once per successful open (and on token updates)
//! - `close()` is terminal; no retry can fire after it
//! - Dropping the last [`Socket`] stops the dispatcher; handlers hold a [`WeakSocket`]
//!
//! # Quick Start
//!
//! ```no_run
//! use panel_socket::{EventName, Result, ServerEvent, Socket, SocketEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = Socket::builder()
//!         .origin("https://panel.example.com")
//!         .build()?;
//!
//!     let handle = socket.downgrade();
//!     socket.on("auth success", move |_| {
//!         if let Some(socket) = handle.upgrade() {
//!             socket.send("set state", "restart");
//!         }
//!     });
//!
//!     socket.on("status", |event| {
//!         if let SocketEvent::Server(envelope) = event
//!             && let ServerEvent::Status { state } = envelope.parse()
//!         {
//!             println!("Server status: {state}");
//!         }
//!     });
//!
//!     socket.on(EventName::Error, |event| eprintln!("{:?}", event.error()));
//!
//!     socket.set_token("jwt", false).connect("wss://node.example.com/api/servers/1/ws")?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     socket.shutdown(None, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`socket`] | [`Socket`], [`SocketBuilder`], [`BackoffPolicy`] |
//! | [`protocol`] | [`Envelope`] wire format and [`SocketEvent`] types |
//! | [`transport`] | [`Connector`] trait and WebSocket implementation |
//! | [`credentials`] | HTTPS retrieval of socket URL and token |
//! | [`config`] | Environment settings for the bundled binary |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Environment settings for the bundled binary.
pub mod config;

/// Connection info retrieval.
pub mod credentials;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Envelope wire format and emitted events.
pub mod protocol;

/// Connection-lifecycle socket.
///
/// Use [`Socket::builder()`] to create a configured socket.
pub mod socket;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Socket types
pub use socket::{
    BackoffPolicy, CLOSE_MANUAL_RECONNECT, CLOSE_NORMAL, CLOSE_OPEN_TIMEOUT, CLOSE_SUPERSEDED,
    ConnectionState, EventHandler, Socket, SocketBuilder, Status, WeakSocket,
};

// Protocol types
pub use protocol::{Envelope, EventName, Payload, ServerEvent, SocketEvent};

// Transport types
pub use transport::{Connector, FrameSink, FrameStream, WsConnector};

// Credential types
pub use credentials::{CredentialRequest, SocketInfo};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{AttemptId, SubscriptionId};

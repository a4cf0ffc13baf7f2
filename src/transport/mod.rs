//! WebSocket transport layer.
//!
//! This module dials the control server and pumps frames for one attempt
//! at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   Signal(attempt)   ┌──────────────────┐   WebSocket   ┌──────────┐
//! │    Dispatcher    │◄────────────────────│  Transport task  │◄─────────────►│  Server  │
//! │ (socket::core)   │────────────────────►│  (per attempt)   │               │          │
//! └──────────────────┘   TransportHandle   └──────────────────┘               └──────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connector` | `Connector` trait and the `tokio-tungstenite` implementation |
//! | `connection` | Per-attempt task, `TransportHandle` and `Signal` |

// ============================================================================
// Submodules
// ============================================================================

/// Transport dialing.
pub mod connector;

/// Per-attempt transport task.
mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{Connector, FrameSink, FrameStream, WsConnector};

pub(crate) use connection::{Signal, TransportHandle};

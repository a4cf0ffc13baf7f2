//! Connection-lifecycle socket.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Socket`] | Cloneable handle exposing the public operations |
//! | [`WeakSocket`] | Non-owning handle for use inside event handlers |
//! | [`SocketBuilder`] | Fluent configuration builder |
//! | [`BackoffPolicy`] | Retry delay floor, step and cap |
//! | [`Status`] | Dispatcher state snapshot |
//! | [`EventHandler`] | Subscriber callback type |

// ============================================================================
// Submodules
// ============================================================================

/// Retry backoff policy and counter.
pub mod backoff;

/// Fluent builder for socket configuration.
pub mod builder;

/// Socket handle and dispatcher.
pub mod core;

/// Subscriber registry.
mod subscribers;

/// Single-shot timer slots.
mod timer;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::BackoffPolicy;
pub use builder::SocketBuilder;
pub use self::core::{
    CLOSE_MANUAL_RECONNECT, CLOSE_NORMAL, CLOSE_OPEN_TIMEOUT, CLOSE_SUPERSEDED, ConnectionState,
    Socket, Status, WeakSocket,
};
pub use subscribers::EventHandler;

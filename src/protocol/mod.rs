//! Wire protocol and event types.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `Envelope` | both | `{ "event": <name>, "args": [<string>, ...] }` |
//! | `SocketEvent` | socket → owner | Lifecycle notices and forwarded envelopes |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope framing and payload normalization |
//! | `event` | Subscription names and emitted events |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope framing.
pub mod envelope;

/// Event names and event values.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{AUTH_EVENT, Envelope, Payload};
pub use event::{EventName, ServerEvent, SocketEvent};

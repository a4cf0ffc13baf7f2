//! Event types delivered to subscribers.
//!
//! Two layers exist:
//!
//! - [`SocketEvent`] is what the socket emits. Lifecycle notices are typed
//!   variants; every inbound envelope is forwarded unchanged as
//!   [`SocketEvent::Server`].
//! - [`ServerEvent`] is an owner-side helper that interprets an envelope
//!   against the known server vocabulary. The socket never uses it.
//!
//! # Server Vocabulary
//!
//! | Event | Args |
//! |-------|------|
//! | `auth success` | none |
//! | `token expiring` | none |
//! | `token expired` | none |
//! | `jwt error` | `[message]` |
//! | `status` | `[state]` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

use super::envelope::Envelope;

// ============================================================================
// EventName
// ============================================================================

/// Subscription key for [`SocketEvent`]s.
///
/// `&str` and `String` convert into [`EventName::Server`], so
/// `socket.on("status", ..)` subscribes to the server's `status` event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Transport opened.
    Open,
    /// Transport closed.
    Close,
    /// Transport or attempt failure.
    Error,
    /// A scheduled retry is about to open a new transport.
    Reconnect,
    /// `reconnect()` was called by the owner.
    ReconnectRequested,
    /// A server-pushed event name.
    Server(String),
}

impl EventName {
    /// Creates a server event name.
    #[inline]
    #[must_use]
    pub fn server(name: impl Into<String>) -> Self {
        Self::Server(name.into())
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self::Server(name.to_owned())
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self::Server(name)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("ws:open"),
            Self::Close => f.write_str("ws:close"),
            Self::Error => f.write_str("ws:error"),
            Self::Reconnect => f.write_str("ws:reconnect"),
            Self::ReconnectRequested => f.write_str("ws:reconnect-requested"),
            Self::Server(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// SocketEvent
// ============================================================================

/// An event emitted by the socket.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// Transport opened; authentication follows immediately.
    Open,
    /// An open transport closed.
    Close,
    /// A failure on the current attempt or transport.
    Error(Arc<Error>),
    /// Fired just before a scheduled retry.
    Reconnect,
    /// Fired when the owner forces a reconnect.
    ReconnectRequested,
    /// An inbound envelope, forwarded verbatim.
    Server(Envelope),
}

impl SocketEvent {
    /// Returns the subscription key for this event.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            Self::Open => EventName::Open,
            Self::Close => EventName::Close,
            Self::Error(_) => EventName::Error,
            Self::Reconnect => EventName::Reconnect,
            Self::ReconnectRequested => EventName::ReconnectRequested,
            Self::Server(envelope) => EventName::Server(envelope.event.clone()),
        }
    }

    /// Returns the envelope arguments for server events, empty otherwise.
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[String] {
        match self {
            Self::Server(envelope) => &envelope.args,
            _ => &[],
        }
    }

    /// Returns the error for [`SocketEvent::Error`].
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// ServerEvent
// ============================================================================

/// Server events interpreted for type-safe handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The token was accepted.
    AuthSuccess,
    /// The token is about to expire; send a fresh one.
    TokenExpiring,
    /// The token expired; the server will stop sending data.
    TokenExpired,
    /// The token was rejected.
    JwtError {
        /// Server-supplied reason.
        message: String,
    },
    /// Server power state changed.
    Status {
        /// State name (`starting`, `running`, `stopping`, `offline`).
        state: String,
    },
    /// Anything else.
    Unknown {
        /// Event name.
        event: String,
        /// Event args.
        args: Vec<String>,
    },
}

impl ServerEvent {
    /// Interprets an envelope.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let first = || envelope.first_arg().unwrap_or_default().to_owned();

        match envelope.event.as_str() {
            "auth success" => Self::AuthSuccess,
            "token expiring" => Self::TokenExpiring,
            "token expired" => Self::TokenExpired,
            "jwt error" => Self::JwtError { message: first() },
            "status" => Self::Status {
                state: envelope.first_arg().unwrap_or("unknown").to_owned(),
            },
            _ => Self::Unknown {
                event: envelope.event.clone(),
                args: envelope.args.clone(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_converts_to_server_name() {
        assert_eq!(EventName::from("status"), EventName::Server("status".into()));
        assert_eq!(EventName::from("open".to_string()), EventName::server("open"));
        assert_ne!(EventName::from("open"), EventName::Open);
    }

    #[test]
    fn test_event_name_mapping() {
        let envelope = Envelope::new("status", "running");
        assert_eq!(SocketEvent::Server(envelope).name(), EventName::server("status"));
        assert_eq!(SocketEvent::Open.name(), EventName::Open);

        let err = SocketEvent::Error(Arc::new(Error::ConnectionClosed));
        assert_eq!(err.name(), EventName::Error);
        assert!(err.error().is_some());
        assert!(err.args().is_empty());
    }

    #[test]
    fn test_parse_status() {
        let envelope = Envelope::new("status", "starting");
        assert_eq!(
            envelope.parse(),
            ServerEvent::Status {
                state: "starting".into()
            }
        );

        let bare = Envelope::new("status", ());
        assert_eq!(
            bare.parse(),
            ServerEvent::Status {
                state: "unknown".into()
            }
        );
    }

    #[test]
    fn test_parse_token_lifecycle() {
        assert_eq!(Envelope::new("auth success", ()).parse(), ServerEvent::AuthSuccess);
        assert_eq!(Envelope::new("token expiring", ()).parse(), ServerEvent::TokenExpiring);
        assert_eq!(Envelope::new("token expired", ()).parse(), ServerEvent::TokenExpired);
        assert_eq!(
            Envelope::new("jwt error", "signature mismatch").parse(),
            ServerEvent::JwtError {
                message: "signature mismatch".into()
            }
        );
    }

    #[test]
    fn test_parse_unknown() {
        match Envelope::new("console output", "[12:00:00] Done").parse() {
            ServerEvent::Unknown { event, args } => {
                assert_eq!(event, "console output");
                assert_eq!(args, vec!["[12:00:00] Done".to_string()]);
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}

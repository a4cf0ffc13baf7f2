//! Envelope wire format.
//!
//! Every frame in either direction is a single JSON text message:
//!
//! ```json
//! { "event": "send logs", "args": ["line one", "line two"] }
//! ```
//!
//! Outgoing payloads are normalized by [`Payload`] so a scalar argument is
//! always sent as a one-element sequence.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{from_str, to_string};

use crate::error::{Error, Result};

use super::event::ServerEvent;

// ============================================================================
// Envelope
// ============================================================================

/// A single `{ event, args }` wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, e.g. `auth` or `status`.
    pub event: String,

    /// Positional string arguments.
    ///
    /// A missing or `null` `args` decodes as empty. Every element must be a
    /// string: a frame with any non-string argument (number, object, nested
    /// list) fails to decode and is dropped by the socket with a warning.
    #[serde(default, deserialize_with = "nullable_args")]
    pub args: Vec<String>,
}

impl Envelope {
    /// Creates an envelope from an event name and payload.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            event: event.into(),
            args: payload.into().into_args(),
        }
    }

    /// Creates the `auth` envelope carrying `token`.
    #[inline]
    #[must_use]
    pub fn auth(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self::new(AUTH_EVENT, token)
    }

    /// Encodes the envelope as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(to_string(self)?)
    }

    /// Decodes a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not an envelope.
    pub fn decode(text: &str) -> Result<Self> {
        from_str(text).map_err(|e| Error::protocol(format!("malformed frame: {e}")))
    }

    /// Returns the first argument, if any.
    #[inline]
    #[must_use]
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Interprets the envelope against the known server vocabulary.
    #[inline]
    #[must_use]
    pub fn parse(&self) -> ServerEvent {
        ServerEvent::from_envelope(self)
    }
}

/// Event name of the authentication message.
pub const AUTH_EVENT: &str = "auth";

/// Accepts `"args": null` as an empty sequence.
fn nullable_args<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Payload
// ============================================================================

/// Outgoing envelope arguments.
///
/// Scalars become one-element sequences, `()` and `None` become an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<String>);

impl Payload {
    /// Empty payload.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Consumes the payload into its argument list.
    #[inline]
    #[must_use]
    pub fn into_args(self) -> Vec<String> {
        self.0
    }
}

impl From<()> for Payload {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(vec![value.to_owned()])
    }
}

impl From<&String> for Payload {
    fn from(value: &String) -> Self {
        Self(vec![value.clone()])
    }
}

impl From<Vec<String>> for Payload {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<Vec<&str>> for Payload {
    fn from(value: Vec<&str>) -> Self {
        Self(value.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for Payload {
    fn from(value: &[&str]) -> Self {
        Self(value.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Payload {
    fn from(value: [&str; N]) -> Self {
        Self(value.into_iter().map(str::to_owned).collect())
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

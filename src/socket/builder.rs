//! Builder pattern for socket configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use panel_socket::{BackoffPolicy, Socket};
//!
//! # async fn example() -> panel_socket::Result<()> {
//! let socket = Socket::builder()
//!     .origin("https://panel.example.com")
//!     .backoff(BackoffPolicy::new(
//!         Duration::from_secs(2),
//!         Duration::from_secs(1),
//!         Duration::from_secs(10),
//!     ))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::{Connector, WsConnector};

use super::backoff::BackoffPolicy;
use super::core::Socket;

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`Socket`].
///
/// Use [`Socket::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SocketBuilder {
    /// Retry delay policy.
    backoff: BackoffPolicy,
    /// `Origin` header for the built-in connector.
    origin: Option<String>,
    /// Custom transport connector.
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for SocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketBuilder")
            .field("backoff", &self.backoff)
            .field("origin", &self.origin)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// SocketBuilder Implementation
// ============================================================================

impl SocketBuilder {
    /// Creates a builder with the default backoff and connector.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry delay policy.
    #[inline]
    #[must_use]
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Sets the `Origin` header sent on every upgrade request.
    ///
    /// Panels usually reject sockets whose origin is not the panel URL.
    #[inline]
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Replaces the built-in WebSocket connector.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validates the configuration and spawns the socket's dispatcher.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the backoff policy is invalid
    /// - [`Error::Config`] if the origin is not a valid header value
    /// - [`Error::Config`] if both an origin and a custom connector are set
    /// - [`Error::Config`] if called outside a Tokio runtime
    pub fn build(self) -> Result<Socket> {
        self.backoff.validate()?;
        let connector = self.resolve_connector()?;

        let runtime = Handle::try_current().map_err(|_| {
            Error::config(
                "Socket must be built inside a Tokio runtime.\n\
                 Example: #[tokio::main] async fn main() { Socket::builder().build() }",
            )
        })?;

        Ok(Socket::spawn(&runtime, connector, self.backoff))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SocketBuilder {
    /// Picks the connector to use.
    fn resolve_connector(&self) -> Result<Arc<dyn Connector>> {
        match (&self.connector, &self.origin) {
            (Some(_), Some(_)) => Err(Error::config(
                "Origin applies to the built-in connector only. \
                 Set the header inside the custom connector instead.",
            )),
            (Some(connector), None) => Ok(Arc::clone(connector)),
            (None, Some(origin)) => Ok(Arc::new(WsConnector::with_origin(origin)?)),
            (None, None) => Ok(Arc::new(WsConnector::new())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

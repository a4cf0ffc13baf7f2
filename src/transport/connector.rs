//! Transport dialing.
//!
//! A [`Connector`] turns a URL into an open, split duplex of WebSocket
//! frames. The socket calls it once per attempt and never shares the
//! returned halves.
//!
//! [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`. Tests and embedders can supply their own.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Outgoing half of an open transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Incoming half of an open transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

// ============================================================================
// Connector
// ============================================================================

/// Opens transports for the socket.
///
/// `connect` resolving with `Ok` means the transport reached the open state.
/// The returned future may be dropped at any point (watchdog expiry, manual
/// close), so implementations must not rely on running to completion.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dials `url` and completes the handshake.
    ///
    /// # Errors
    ///
    /// Any error is reported as a failed attempt and retried with backoff.
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    /// Value of the `Origin` header on the upgrade request.
    origin: Option<HeaderValue>,
}

impl WsConnector {
    /// Creates a connector without an `Origin` header.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { origin: None }
    }

    /// Creates a connector that sends `origin` as the `Origin` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `origin` is not a valid header value.
    pub fn with_origin(origin: &str) -> Result<Self> {
        let origin = HeaderValue::from_str(origin)
            .map_err(|e| Error::config(format!("Invalid Origin header {origin:?}: {e}")))?;

        Ok(Self {
            origin: Some(origin),
        })
    }

    /// Returns the configured `Origin` header value.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_ref().and_then(|v| v.to_str().ok())
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
        let mut request = url.as_str().into_client_request()?;

        if let Some(origin) = &self.origin {
            request.headers_mut().insert(ORIGIN, origin.clone());
        }

        let (ws_stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(url = %url, status = %response.status(), "WebSocket handshake completed");

        let (sink, stream) = ws_stream.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_origin() {
        assert!(WsConnector::new().origin().is_none());
        assert!(WsConnector::default().origin().is_none());
    }

    #[test]
    fn test_with_origin() {
        let connector = WsConnector::with_origin("https://panel.example.com").expect("valid origin");
        assert_eq!(connector.origin(), Some("https://panel.example.com"));
    }

    #[test]
    fn test_with_invalid_origin() {
        let err = WsConnector::with_origin("bad\norigin").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/socket")).expect("url");
        let result = WsConnector::new().connect(&url).await;
        assert!(result.is_err());
    }
}

//! Connection info retrieval.
//!
//! Panels hand out the socket endpoint and a short-lived JWT from an HTTPS
//! endpoint authenticated by the browser session cookie and XSRF token:
//!
//! ```json
//! { "data": { "socket": "wss://node.example.com/api/servers/<uuid>/ws", "token": "<jwt>" } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, PRAGMA, USER_AGENT};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Browser user agent sent with the request.
///
/// Panels behind bot protection reject non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36 Edg/139.0.0.0";

// ============================================================================
// SocketInfo
// ============================================================================

/// Socket endpoint and token returned by the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    /// WebSocket URL.
    pub socket: String,
    /// Authentication token.
    pub token: String,
}

/// Response body wrapper.
#[derive(Debug, Deserialize)]
struct InfoResponse {
    data: RawInfo,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    socket: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl SocketInfo {
    /// Parses a response body.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the body is not the expected shape
    /// - [`Error::Credentials`] if `socket` or `token` is missing or empty
    pub fn from_body(body: &str) -> Result<Self> {
        let response: InfoResponse = serde_json::from_str(body)?;

        let socket = response.data.socket.filter(|s| !s.is_empty());
        let token = response.data.token.filter(|t| !t.is_empty());

        match (socket, token) {
            (Some(socket), Some(token)) => Ok(Self { socket, token }),
            _ => Err(Error::credentials(
                "WebSocket info is missing required fields",
            )),
        }
    }
}

// ============================================================================
// CredentialRequest
// ============================================================================

/// A session-authenticated request for [`SocketInfo`].
#[derive(Debug, Clone)]
pub struct CredentialRequest {
    endpoint: Url,
    headers: HeaderMap,
}

impl CredentialRequest {
    /// Creates a request for `endpoint`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `endpoint` is not an `https://` URL
    /// - [`Error::Config`] if the cookie or XSRF token is not a valid header value
    pub fn new(endpoint: &str, cookie: &str, xsrf_token: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid info address {endpoint:?}: {e}")))?;

        if endpoint.scheme() != "https" {
            return Err(Error::config(format!(
                "Info address must use https, got {}",
                endpoint.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert("dnt", HeaderValue::from_static("1"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert("priority", HeaderValue::from_static("u=1, i"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(COOKIE, header_value("COOKIE", cookie)?);
        headers.insert("x-xsrf-token", header_value("TOKEN", xsrf_token)?);

        Ok(Self { endpoint, headers })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Performs the request.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails
    /// - [`Error::Credentials`] on a non-success status or missing fields
    pub async fn fetch(&self, client: &Client) -> Result<SocketInfo> {
        debug!(endpoint = %self.endpoint, "Retrieving WebSocket info");

        let response = client
            .get(self.endpoint.clone())
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::credentials(format!(
                "Failed to fetch WebSocket info: {status}"
            )));
        }

        let body = response.text().await?;
        SocketInfo::from_body(&body)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("{name} is not a valid header value: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

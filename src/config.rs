//! Environment settings for the `panel-restart` binary.
//!
//! | Variable | Required | Meaning |
//! |----------|----------|---------|
//! | `WEBSOCKET_INFO_ADDRESS` | yes | `https://` URL returning socket info |
//! | `COOKIE` | yes | Panel session cookie header |
//! | `TOKEN` | yes | XSRF token for the panel session |
//! | `ORIGIN_HEADER` | no | `Origin` header for the WebSocket upgrade |

// ============================================================================
// Imports
// ============================================================================

use crate::credentials::CredentialRequest;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Variable holding the socket info endpoint.
pub const INFO_ADDRESS_VAR: &str = "WEBSOCKET_INFO_ADDRESS";

/// Variable holding the session cookie.
pub const COOKIE_VAR: &str = "COOKIE";

/// Variable holding the XSRF token.
pub const TOKEN_VAR: &str = "TOKEN";

/// Variable holding the optional origin header.
pub const ORIGIN_VAR: &str = "ORIGIN_HEADER";

// ============================================================================
// Settings
// ============================================================================

/// Validated binary settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Socket info endpoint (`https://` only).
    pub info_address: String,
    /// Session cookie.
    pub cookie: String,
    /// XSRF token.
    pub xsrf_token: String,
    /// `Origin` header for the socket.
    pub origin: Option<String>,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let info_address = lookup(INFO_ADDRESS_VAR)
            .filter(|v| v.starts_with("https://"))
            .ok_or_else(|| {
                Error::config(format!(
                    "{INFO_ADDRESS_VAR} environment variable is not set or invalid.\n\
                     Example: {INFO_ADDRESS_VAR}=https://panel.example.com/api/client/servers/<id>/websocket"
                ))
            })?;

        let (Some(cookie), Some(xsrf_token)) = (lookup(COOKIE_VAR), lookup(TOKEN_VAR)) else {
            return Err(Error::config(format!(
                "{COOKIE_VAR} and {TOKEN_VAR} environment variables must be set"
            )));
        };

        let origin = lookup(ORIGIN_VAR).filter(|v| !v.is_empty());

        Ok(Self {
            info_address,
            cookie,
            xsrf_token,
            origin,
        })
    }

    /// Builds the credential request described by these settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is not a valid header or URL.
    pub fn credential_request(&self) -> Result<CredentialRequest> {
        CredentialRequest::new(&self.info_address, &self.cookie, &self.xsrf_token)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const ADDRESS: &str = "https://panel.example.com/api/client/servers/1/websocket";

    #[test]
    fn test_complete_settings() {
        let settings = Settings::from_lookup(lookup(&[
            (INFO_ADDRESS_VAR, ADDRESS),
            (COOKIE_VAR, "session=abc"),
            (TOKEN_VAR, "xsrf"),
            (ORIGIN_VAR, "https://panel.example.com"),
        ]))
        .expect("settings");

        assert_eq!(settings.info_address, ADDRESS);
        assert_eq!(settings.origin.as_deref(), Some("https://panel.example.com"));
        assert!(settings.credential_request().is_ok());
    }

    #[test]
    fn test_origin_is_optional() {
        let settings = Settings::from_lookup(lookup(&[
            (INFO_ADDRESS_VAR, ADDRESS),
            (COOKIE_VAR, "session=abc"),
            (TOKEN_VAR, "xsrf"),
            (ORIGIN_VAR, ""),
        ]))
        .expect("settings");

        assert!(settings.origin.is_none());
    }

    #[test]
    fn test_rejects_plain_http_address() {
        let err = Settings::from_lookup(lookup(&[
            (INFO_ADDRESS_VAR, "http://panel.example.com"),
            (COOKIE_VAR, "session=abc"),
            (TOKEN_VAR, "xsrf"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains(INFO_ADDRESS_VAR));
    }

    #[test]
    fn test_requires_cookie_and_token() {
        let err = Settings::from_lookup(lookup(&[(INFO_ADDRESS_VAR, ADDRESS), (TOKEN_VAR, "xsrf")]))
            .unwrap_err();

        assert!(err.to_string().contains("COOKIE and TOKEN"));
    }
}

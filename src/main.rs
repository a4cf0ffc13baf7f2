//! `panel-restart` - restarts a panel server over its control socket.
//!
//! Fetches the socket URL and token with the session cookie, authenticates,
//! sends `set state restart` and waits until the server reports `starting`.
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Server reported `starting` |
//! | 1 | Configuration, credential, socket or JWT error |
//! | 130 | Interrupted |
//!
//! # Usage
//!
//! ```bash
//! WEBSOCKET_INFO_ADDRESS=https://panel.example.com/api/client/servers/<id>/websocket \
//! COOKIE='pterodactyl_session=...' TOKEN='<xsrf>' \
//! RUST_LOG=panel_socket=debug panel-restart
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::process::ExitCode;

use panel_socket::config::Settings;
use panel_socket::{CredentialRequest, Result, ServerEvent, Socket, SocketEvent, WeakSocket};
use reqwest::Client;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "panel_socket=info,panel_restart=info";

/// Exit code after Ctrl+C.
const EXIT_INTERRUPTED: u8 = 130;

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes tracing from `RUST_LOG`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run() -> Result<ExitCode> {
    let settings = Settings::from_env()?;
    let request = settings.credential_request()?;
    let client = Client::new();

    info!(endpoint = %request.endpoint(), "Retrieving WebSocket info");
    let info = request.fetch(&client).await?;

    let mut builder = Socket::builder();
    if let Some(origin) = &settings.origin {
        builder = builder.origin(origin.clone());
    }
    let socket = builder.build()?;

    let events = socket.listen();
    socket.set_token(info.token, false).connect(info.socket)?;

    let code = tokio::select! {
        code = drive(&socket, events, &request, &client) => code,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    };

    if let Err(e) = socket.shutdown(None, None).await {
        warn!(error = %e, "Socket already stopped");
    }
    Ok(code)
}

// ============================================================================
// Event Handling
// ============================================================================

/// Reacts to socket events until one decides the exit code.
async fn drive(
    socket: &Socket,
    mut events: UnboundedReceiver<SocketEvent>,
    request: &CredentialRequest,
    client: &Client,
) -> ExitCode {
    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Open => info!("WebSocket connection established"),
            SocketEvent::Close => info!("WebSocket connection closed"),
            SocketEvent::Reconnect => info!("Attempting to reconnect"),
            SocketEvent::ReconnectRequested => info!("Manual reconnect requested"),

            SocketEvent::Error(e) => {
                error!(error = %e, "WebSocket error");
                return ExitCode::FAILURE;
            }

            SocketEvent::Server(envelope) => match envelope.parse() {
                ServerEvent::AuthSuccess => {
                    info!("Authenticated, sending restart");
                    socket.send("set state", "restart");
                }

                ServerEvent::TokenExpiring => {
                    info!("Token expiring, refreshing");
                    refresh_token(socket.downgrade(), request.clone(), client.clone());
                }

                ServerEvent::TokenExpired => error!("Token expired"),

                ServerEvent::JwtError { message } => {
                    error!(%message, "JWT error");
                    return ExitCode::FAILURE;
                }

                ServerEvent::Status { state } => {
                    info!(%state, "Server status");
                    if state == "starting" {
                        return ExitCode::SUCCESS;
                    }
                }

                ServerEvent::Unknown { .. } => {}
            },
        }
    }

    error!("Socket stopped unexpectedly");
    ExitCode::FAILURE
}

/// Fetches a fresh token in the background and re-authenticates with it.
fn refresh_token(socket: WeakSocket, request: CredentialRequest, client: Client) {
    tokio::spawn(async move {
        match request.fetch(&client).await {
            Ok(info) => {
                if let Some(socket) = socket.upgrade() {
                    socket.set_token(info.token, true);
                }
            }
            Err(e) => error!(error = %e, "Token refresh failed"),
        }
    });
}

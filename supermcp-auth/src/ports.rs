//! Loopback port probing for the OAuth callback server

use tokio::net::TcpListener;

use crate::error::{AuthError, AuthResult};

/// Host both the port finder and the callback server bind. Using one
/// address for both is what keeps the probe result valid.
pub const CALLBACK_HOST: &str = "127.0.0.1";

/// Preferred first callback port
pub const DEFAULT_CALLBACK_PORT: u16 = 5173;

/// How many sequential ports to probe
pub const DEFAULT_PORT_ATTEMPTS: u16 = 10;

/// Probe sequential ports starting at `start`, returning the first one
/// that binds on the loopback address.
pub async fn find_free_port(start: u16, attempts: u16) -> AuthResult<u16> {
    for offset in 0..attempts {
        let port = start.saturating_add(offset);
        match TcpListener::bind((CALLBACK_HOST, port)).await {
            Ok(listener) => {
                drop(listener);
                return Ok(port);
            }
            Err(_) => continue,
        }
    }
    Err(AuthError::NoFreePort { start, attempts })
}

/// Whether one specific port is currently free
pub async fn port_is_free(port: u16) -> bool {
    TcpListener::bind((CALLBACK_HOST, port)).await.is_ok()
}

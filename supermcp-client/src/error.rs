//! Error types for upstream client operations

use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Upstream client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// The child process could not be spawned
    #[error("failed to spawn '{command}': {source}{hint}")]
    Spawn {
        command: String,
        hint: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level failure (pipe closed, connection reset, bad frame)
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The initial connection handshake failed
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// JSON (de)serialization failure on the wire
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A request exceeded its deadline
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The client was closed while the request was queued or in flight
    #[error("client closed")]
    Closed,

    /// The upstream rejected the request with 401/Unauthorized
    #[error("unauthorized for package '{package}'; run authenticate(\"{package}\") to sign in")]
    Unauthorized { package: String },

    /// Stored credentials no longer match the upstream's registration
    #[error("invalid token for package '{package}': {message}")]
    InvalidToken { package: String, message: String },

    /// Authentication is required but only a browser flow can produce it
    #[error("authentication required for package '{package}'")]
    AuthRequired { package: String },

    /// OAuth machinery failure
    #[error(transparent)]
    Auth(#[from] supermcp_auth::AuthError),

    /// The upstream returned a JSON-RPC error
    #[error("upstream error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The upstream's reply violated the protocol
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl ClientError {
    /// Whether the error indicates missing or rejected authorization.
    /// Used to classify catalog load failures and connect failures.
    pub fn is_auth_shaped(&self) -> bool {
        match self {
            ClientError::Unauthorized { .. }
            | ClientError::InvalidToken { .. }
            | ClientError::AuthRequired { .. }
            | ClientError::Auth(_) => true,
            other => {
                let message = other.to_string().to_lowercase();
                ["oauth", "401", "unauthorized", "invalid_token", "authorization"]
                    .iter()
                    .any(|marker| message.contains(marker))
            }
        }
    }

    /// Whether a connect failure indicates the server only speaks the
    /// older HTTP+SSE protocol, warranting a single SSE fallback attempt.
    pub fn is_sse_fallback_shaped(&self) -> bool {
        let message = self.to_string();
        ["Missing sessionId parameter", "HTTP 404", "405 Method Not Allowed"]
            .iter()
            .any(|marker| message.contains(marker))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Transport {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_shaped_classification() {
        assert!(ClientError::Unauthorized {
            package: "p".to_string()
        }
        .is_auth_shaped());
        assert!(ClientError::Transport {
            message: "server said 401".to_string()
        }
        .is_auth_shaped());
        assert!(ClientError::ConnectionFailed {
            message: "OAuth token rejected".to_string()
        }
        .is_auth_shaped());
        assert!(!ClientError::Transport {
            message: "connection reset by peer".to_string()
        }
        .is_auth_shaped());
    }

    #[test]
    fn test_sse_fallback_classification() {
        assert!(ClientError::ConnectionFailed {
            message: "HTTP 405 Method Not Allowed".to_string()
        }
        .is_sse_fallback_shaped());
        assert!(ClientError::ConnectionFailed {
            message: "Missing sessionId parameter".to_string()
        }
        .is_sse_fallback_shaped());
        assert!(ClientError::ConnectionFailed {
            message: "HTTP 404".to_string()
        }
        .is_sse_fallback_shaped());
        assert!(!ClientError::ConnectionFailed {
            message: "connection refused".to_string()
        }
        .is_sse_fallback_shaped());
    }
}

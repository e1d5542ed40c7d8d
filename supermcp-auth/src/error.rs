//! Error types for OAuth operations

use std::time::Duration;
use thiserror::Error;

/// Result type for OAuth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// OAuth errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// A browser flow is needed but the provider is in refresh-only mode
    #[error("authentication required for package '{package}'")]
    AuthenticationRequired { package: String },

    /// The upstream rejected the credentials
    #[error("unauthorized for package '{package}': {message}")]
    Unauthorized { package: String, message: String },

    /// Stored credentials are invalid and have been discarded
    #[error("invalid token for package '{package}': {message}")]
    InvalidToken { package: String, message: String },

    /// Authorization server metadata could not be discovered
    #[error("OAuth discovery failed for {url}: {message}")]
    Discovery { url: String, message: String },

    /// Dynamic client registration failed
    #[error("OAuth client registration failed: {message}")]
    Registration { message: String },

    /// Authorization code or refresh token exchange failed
    #[error("OAuth token exchange failed: {message}")]
    Exchange { message: String },

    /// The user's browser returned an error to the callback
    #[error("authorization denied: {error}")]
    AuthorizationDenied { error: String },

    /// No callback arrived before the deadline
    #[error("timed out waiting for OAuth callback after {timeout:?}")]
    CallbackTimeout { timeout: Duration },

    /// The callback server could not bind
    #[error("failed to bind OAuth callback server on 127.0.0.1:{port}: {source}")]
    CallbackBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// No free loopback port was found
    #[error("no free port found after {attempts} attempts starting at {start}")]
    NoFreePort { start: u16, attempts: u16 },

    /// HTTP-level failure talking to the authorization server
    #[error("OAuth HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed URL in descriptor or metadata
    #[error("invalid OAuth URL: {0}")]
    Url(#[from] url::ParseError),

    /// A transient record the flow depends on is missing
    #[error("missing {what} for package '{package}'; restart the authentication flow")]
    MissingTransient { package: String, what: &'static str },
}

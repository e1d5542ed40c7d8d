//! Registry error types

use thiserror::Error;

/// Registry result type
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No package with this id is configured
    #[error("package '{id}' not found")]
    PackageNotFound { id: String },

    /// Connecting the package's client failed
    #[error("failed to connect package '{id}': {message}")]
    Connect { id: String, message: String },

    /// A client operation failed
    #[error(transparent)]
    Client(#[from] supermcp_client::ClientError),
}

impl RegistryError {
    /// Whether the failure looks like missing or rejected authorization
    pub fn is_auth_shaped(&self) -> bool {
        match self {
            RegistryError::Client(e) => e.is_auth_shaped(),
            other => {
                let message = other.to_string().to_lowercase();
                ["oauth", "401", "unauthorized", "invalid_token", "authorization"]
                    .iter()
                    .any(|marker| message.contains(marker))
            }
        }
    }
}

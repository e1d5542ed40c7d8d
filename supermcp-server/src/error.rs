//! Handler errors and their JSON-RPC error codes
//!
//! Every user-visible failure carries a concrete recovery suggestion:
//! an install hint when the command is missing, an `authenticate` hint on
//! 401, a `health_check_all` hint on transport trouble.

use thiserror::Error;

use supermcp_client::ClientError;
use supermcp_registry::RegistryError;

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Handler errors, one variant per published error code
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("package '{id}' not found")]
    PackageNotFound { id: String },

    #[error("tool '{tool}' not found in package '{package}'")]
    ToolNotFound { package: String, tool: String },

    #[error("argument validation failed: {message}")]
    ArgValidationFailed { message: String },

    #[error("package '{package}' is unavailable: {reason}")]
    PackageUnavailable { package: String, reason: String },

    #[error("authentication required for package '{package}'; run authenticate(\"{package}\")")]
    AuthRequired { package: String },

    #[error("authentication incomplete: {message}")]
    AuthIncomplete { message: String },

    #[error("downstream error from package '{package}': {message}")]
    Downstream { package: String, message: String },

    #[error("tool blocked: {reason}")]
    ToolBlocked { reason: String },

    #[error("resource '{uri}' not found")]
    ResourceNotFound { uri: String },

    #[error("package '{package}' does not support {capability}")]
    CapabilityNotSupported { package: String, capability: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// JSON-RPC style error code
    pub fn code(&self) -> i64 {
        match self {
            HandlerError::InvalidParams(_) => -32602,
            HandlerError::PackageNotFound { .. } => -32001,
            HandlerError::ToolNotFound { .. } => -32002,
            HandlerError::ArgValidationFailed { .. } => -32003,
            HandlerError::PackageUnavailable { .. } => -32004,
            HandlerError::AuthRequired { .. } => -32005,
            HandlerError::AuthIncomplete { .. } => -32006,
            HandlerError::Downstream { .. } => -32007,
            HandlerError::ToolBlocked { .. } => -32008,
            HandlerError::ResourceNotFound { .. } => -32010,
            HandlerError::CapabilityNotSupported { .. } => -32011,
            HandlerError::Internal(_) => -32603,
        }
    }

    /// Wrap a client failure for a package, attaching recovery hints.
    pub fn from_client(package: &str, error: ClientError) -> Self {
        match error {
            ClientError::Unauthorized { package } | ClientError::AuthRequired { package } => {
                HandlerError::AuthRequired { package }
            }
            ClientError::InvalidToken { package, message } => HandlerError::AuthRequired {
                package: format!("{} ({})", package, message),
            },
            ClientError::Spawn { command, hint, source } => HandlerError::Downstream {
                package: package.to_string(),
                message: format!("failed to spawn '{}': {}{}", command, source, hint),
            },
            ClientError::Timeout { timeout } => HandlerError::Downstream {
                package: package.to_string(),
                message: format!(
                    "request timed out after {:?}; try health_check_all() to see which packages are reachable",
                    timeout
                ),
            },
            ClientError::Rpc { code, message } => HandlerError::Downstream {
                package: package.to_string(),
                message: format!("upstream error {}: {}", code, message),
            },
            other if other.is_auth_shaped() => HandlerError::AuthRequired {
                package: package.to_string(),
            },
            other => HandlerError::Downstream {
                package: package.to_string(),
                message: format!(
                    "{}; try health_check_all() to see which packages are reachable",
                    other
                ),
            },
        }
    }
}

impl From<RegistryError> for HandlerError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::PackageNotFound { id } => HandlerError::PackageNotFound { id },
            RegistryError::Connect { id, message } => {
                let lowered = message.to_lowercase();
                if ["oauth", "401", "unauthorized", "invalid_token", "authorization"]
                    .iter()
                    .any(|m| lowered.contains(m))
                {
                    HandlerError::AuthRequired { package: id }
                } else {
                    HandlerError::Downstream {
                        package: id,
                        message,
                    }
                }
            }
            RegistryError::Client(e) => HandlerError::from_client("unknown", e),
        }
    }
}

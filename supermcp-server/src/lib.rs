//! Request handlers and front ends for super-mcp
//!
//! The router translates the agent-facing MCP tools into registry and
//! catalog operations with the security policy enforced on every path; the
//! front ends carry that surface over stdio or HTTP.

pub mod error;
pub mod front;
pub mod help;
pub mod paging;
pub mod router;
pub mod search;
pub mod service;
pub mod validation;

pub use error::{HandlerError, HandlerResult};
pub use router::Router;
pub use service::{tool_definitions, McpService};
pub use validation::{validate_args, ValidatedArgs};

use supermcp_config::SkippedPackage;

/// Render the startup side-channel line announcing skipped packages.
///
/// Supervisors parse this, so the shape is load-bearing:
/// `SUPER_MCP_SKIPPED_PACKAGES:{"packages":[...]}` on a single line.
pub fn skipped_packages_line(skipped: &[SkippedPackage]) -> String {
    let body = serde_json::json!({ "packages": skipped });
    format!("SUPER_MCP_SKIPPED_PACKAGES:{}", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_channel_line_shape() {
        let line = skipped_packages_line(&[SkippedPackage {
            id: "x".to_string(),
            reason: "base_url must be a valid URL, got \"not a url\"".to_string(),
        }]);
        assert_eq!(
            line,
            "SUPER_MCP_SKIPPED_PACKAGES:{\"packages\":[{\"id\":\"x\",\"reason\":\"base_url must be a valid URL, got \\\"not a url\\\"\"}]}"
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_side_channel_line_empty() {
        assert_eq!(
            skipped_packages_line(&[]),
            "SUPER_MCP_SKIPPED_PACKAGES:{\"packages\":[]}"
        );
    }
}

//! Help topics for the `get_help` tool

use serde_json::{json, Value};

use supermcp_config::PackageDescriptor;

use crate::error::{HandlerError, HandlerResult};

const TOPICS: [&str; 4] = ["overview", "tools", "authentication", "troubleshooting"];

pub fn render(topic: Option<&str>, packages: &[PackageDescriptor]) -> HandlerResult<Value> {
    let topic = topic.unwrap_or("overview");
    let text = match topic {
        "overview" => overview(packages),
        "tools" => TOOLS_HELP.to_string(),
        "authentication" => AUTH_HELP.to_string(),
        "troubleshooting" => TROUBLESHOOTING_HELP.to_string(),
        other => {
            return Err(HandlerError::InvalidParams(format!(
                "unknown help topic '{}'; available: {}",
                other,
                TOPICS.join(", ")
            )))
        }
    };

    Ok(json!({
        "topic": topic,
        "text": text,
        "topics": TOPICS,
    }))
}

fn overview(packages: &[PackageDescriptor]) -> String {
    let mut lines = vec![
        "super-mcp routes your tool calls to the configured MCP servers (packages).".to_string(),
        "Start with list_tool_packages() to see what is available, then list_tools() or search_tools() to find a tool, and use_tool() to run it.".to_string(),
        String::new(),
        format!("Configured packages ({}):", packages.len()),
    ];
    for package in packages {
        let auth = if package.oauth { " (OAuth)" } else { "" };
        lines.push(format!(
            "  - {}: {}{}",
            package.id,
            package.description.as_deref().unwrap_or(&package.name),
            auth
        ));
    }
    lines.join("\n")
}

const TOOLS_HELP: &str = "\
Tools are addressed by namespaced id: {package}__{tool}, e.g. fs__read_file.
use_tool accepts either the namespaced id alone or package_id plus the short
name. Pass dry_run=true to validate arguments without executing, and
max_output_chars to cap large outputs. list_tools supports name_pattern
globs (* and ?) and cursor pagination.";

const AUTH_HELP: &str = "\
Packages marked (OAuth) need a one-time browser sign-in: run
authenticate(\"<package_id>\"), finish the flow in the browser, and the
tokens are stored locally. Tokens refresh silently afterwards; if a package
reports auth_required again, re-run authenticate.";

const TROUBLESHOOTING_HELP: &str = "\
health_check_all() shows which packages are reachable. A package stuck in
an error state can be restarted with restart_package(\"<package_id>\");
this also re-reads its configuration and environment variables. Check the
stderr log for per-package details.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_topic_is_invalid_params() {
        let err = render(Some("nonsense"), &[]).unwrap_err();
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().contains("overview"));
    }

    #[test]
    fn test_default_topic_lists_packages() {
        let result = render(None, &[]).unwrap();
        assert_eq!(result["topic"], "overview");
        assert!(result["text"].as_str().unwrap().contains("list_tool_packages"));
    }
}

//! The super-mcp binary
//!
//! Usage: `super-mcp <config.json>... [--http [port]]`
//!
//! Serves MCP over stdio by default, or over HTTP with `--http`. Logging
//! goes to stderr so stdout stays clean for the stdio transport; the
//! skipped-packages side channel is a single stderr line emitted before
//! the server starts.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use supermcp_auth::CredentialStore;
use supermcp_config::ConfigLoader;
use supermcp_registry::{PackageRegistry, ToolCatalog};
use supermcp_security::SecurityPolicy;
use supermcp_server::{skipped_packages_line, McpService, Router};

const DEFAULT_HTTP_PORT: u16 = 8722;

struct Args {
    config_paths: Vec<PathBuf>,
    http_port: Option<u16>,
}

fn parse_args(argv: &[String]) -> Result<Args> {
    let mut config_paths = Vec::new();
    let mut http_port = None;

    let mut iter = argv.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--http" => {
                let port = match iter.peek() {
                    Some(next) if !next.starts_with("--") => {
                        let parsed = next
                            .parse()
                            .with_context(|| format!("invalid port '{}'", next))?;
                        iter.next();
                        parsed
                    }
                    _ => DEFAULT_HTTP_PORT,
                };
                http_port = Some(port);
            }
            other if other.starts_with("--") => bail!("unknown option '{}'", other),
            path => config_paths.push(PathBuf::from(path)),
        }
    }

    if config_paths.is_empty() {
        bail!("usage: super-mcp <config.json>... [--http [port]]");
    }
    Ok(Args {
        config_paths,
        http_port,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(&std::env::args().skip(1).collect::<Vec<_>>())?;

    let config = ConfigLoader::new()
        .load(&args.config_paths)
        .context("failed to load configuration")?;

    let policy = SecurityPolicy::compile(&config.security, config.user_disabled.clone());
    let skipped = config.skipped.clone();

    let store = Arc::new(CredentialStore::new());
    let registry = Arc::new(PackageRegistry::new(config, store));
    let catalog = Arc::new(ToolCatalog::new());
    registry.start_reaper();

    let router = Router::new(registry.clone(), catalog, policy);
    let service = McpService::new(router);

    // Side channel for supervisors; exact single-line shape.
    eprintln!("{}", skipped_packages_line(&skipped));
    for skipped_package in &skipped {
        tracing::warn!(
            package = %skipped_package.id,
            reason = %skipped_package.reason,
            "package skipped"
        );
    }

    let served = match args.http_port {
        Some(port) => {
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            tokio::select! {
                result = supermcp_server::front::http::serve(service, addr) => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        None => {
            tokio::select! {
                result = supermcp_server::front::stdio::serve(service) => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
    };

    registry.close_all().await;
    served.context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_config_paths() {
        let parsed = parse_args(&args(&["a.json", "b.json"])).unwrap();
        assert_eq!(parsed.config_paths.len(), 2);
        assert_eq!(parsed.http_port, None);
    }

    #[test]
    fn test_parse_http_with_and_without_port() {
        let parsed = parse_args(&args(&["a.json", "--http"])).unwrap();
        assert_eq!(parsed.http_port, Some(DEFAULT_HTTP_PORT));

        let parsed = parse_args(&args(&["a.json", "--http", "9000"])).unwrap();
        assert_eq!(parsed.http_port, Some(9000));
    }

    #[test]
    fn test_missing_config_is_an_error() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }
}

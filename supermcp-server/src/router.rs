//! Request handlers
//!
//! Handlers are stateless with respect to each other; each one synthesizes
//! its effect from the registry, the catalog and the security policy. The
//! security and user-disabled gates run on every operation.

use futures_util::future::FutureExt;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use supermcp_auth::{
    default_launcher, find_free_port, port_is_free, AuthMode, BrowserLauncher, CallbackServer,
    DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT, DEFAULT_PORT_ATTEMPTS,
};
use supermcp_client::{timeouts, ClientError};
use supermcp_config::{PackageDescriptor, TransportKind};
use supermcp_registry::{
    CatalogStatus, PackageHealth, PackageRegistry, RestartOutcome, ToolCatalog,
};
use supermcp_security::SecurityPolicy;

use crate::error::{HandlerError, HandlerResult};
use crate::help;
use crate::paging::{
    compile_name_pattern, decode_cursor, encode_cursor, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::search::SearchIndex;
use crate::validation::validate_args;

/// Fan-out concurrency for listing and health sweeps
const FANOUT_CONCURRENCY: usize = 5;

/// Output beyond this many characters without a cap gets a warning banner
const OUTPUT_WARNING_CHARS: usize = 150_000;

/// Bounded wait for the post-authentication health verification
const AUTH_VERIFY_TIMEOUT: Duration = Duration::from_secs(20);

/// The request router: registry + catalog + security behind the MCP surface
pub struct Router {
    registry: Arc<PackageRegistry>,
    catalog: Arc<ToolCatalog>,
    policy: RwLock<Arc<SecurityPolicy>>,
    browser: BrowserLauncher,
    search_index: StdMutex<Option<SearchIndex>>,
}

#[derive(Deserialize)]
struct PackageParams {
    package_id: String,
}

#[derive(Deserialize, Default)]
struct ListPackagesParams {
    #[serde(default)]
    include_health: bool,
}

#[derive(Deserialize, Default)]
struct ListToolsParams {
    package_id: Option<String>,
    name_pattern: Option<String>,
    cursor: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct UseToolParams {
    package_id: Option<String>,
    tool_id: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    dry_run: bool,
    max_output_chars: Option<usize>,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Deserialize, Default)]
struct HelpParams {
    topic: Option<String>,
}

fn parse<T: for<'de> Deserialize<'de>>(args: Value) -> HandlerResult<T> {
    serde_json::from_value(args).map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

impl Router {
    pub fn new(
        registry: Arc<PackageRegistry>,
        catalog: Arc<ToolCatalog>,
        policy: SecurityPolicy,
    ) -> Arc<Self> {
        Self::with_browser(registry, catalog, policy, default_launcher())
    }

    /// Construction with an injected browser launcher (tests drive the
    /// OAuth flow without a real browser).
    pub fn with_browser(
        registry: Arc<PackageRegistry>,
        catalog: Arc<ToolCatalog>,
        policy: SecurityPolicy,
        browser: BrowserLauncher,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            catalog,
            policy: RwLock::new(Arc::new(policy)),
            browser,
            search_index: StdMutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<PackageRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<SecurityPolicy> {
        self.policy.read().expect("policy lock").clone()
    }

    /// Swap the policy pointer atomically (config reload)
    pub fn swap_policy(&self, policy: SecurityPolicy) {
        *self.policy.write().expect("policy lock") = Arc::new(policy);
    }

    /// Apply a reloaded configuration: recompile and swap the policy, then
    /// hand the registry the new descriptors. The caller that watches
    /// config files (out of scope here) drives this.
    pub async fn apply_config(&self, config: supermcp_config::LoadedConfig) {
        self.swap_policy(SecurityPolicy::compile(
            &config.security,
            config.user_disabled.clone(),
        ));
        self.registry.apply_config(config).await;
    }

    /// Dispatch one router tool call by name
    pub async fn dispatch(&self, tool: &str, args: Value) -> HandlerResult<Value> {
        match tool {
            "list_tool_packages" => self.list_tool_packages(parse(args)?).await,
            "list_tools" => self.list_tools(parse(args)?).await,
            "use_tool" => self.use_tool(parse(args)?).await,
            "get_help" => self.get_help(parse(args)?).await,
            "health_check" => self.health_check(parse::<PackageParams>(args)?.package_id).await,
            "health_check_all" => self.health_check_all().await,
            "authenticate" => self.authenticate(parse::<PackageParams>(args)?.package_id).await,
            "restart_package" => {
                self.restart_package(parse::<PackageParams>(args)?.package_id).await
            }
            "search_tools" => self.search_tools(parse(args)?).await,
            "read_resource" => self.read_resource(parse(args)?).await,
            other => Err(HandlerError::InvalidParams(format!("unknown tool '{}'", other))),
        }
    }

    async fn visible_packages(&self) -> Vec<PackageDescriptor> {
        self.registry
            .packages()
            .await
            .into_iter()
            .filter(|p| p.is_visible())
            .collect()
    }

    /// `list_tool_packages`: bounded fan-out over all visible packages.
    async fn list_tool_packages(&self, params: ListPackagesParams) -> HandlerResult<Value> {
        let policy = self.policy();
        let packages = self.visible_packages().await;

        let rows: Vec<Value> = stream::iter(packages)
            .map(|descriptor| {
                let policy = policy.clone();
                let registry = self.registry.clone();
                let catalog = self.catalog.clone();
                async move {
                    let entry = catalog.ensure_loaded(&registry, &descriptor.id).await;

                    let health = if params.include_health {
                        let health = registry.health_check(&descriptor.id).await;
                        if health == PackageHealth::Ok {
                            catalog.clear_if_not_ready(&descriptor.id);
                        }
                        Some(health)
                    } else {
                        None
                    };

                    let decision = policy.is_package_blocked(&descriptor.id);
                    let mut row = json!({
                        "id": descriptor.id,
                        "name": descriptor.name,
                        "description": descriptor.description,
                        "transport": descriptor.transport,
                        "status": entry.status,
                        "tool_count": entry.tools.len(),
                    });
                    if let Some(error) = entry.last_error {
                        row["last_error"] = json!(error);
                    }
                    if decision.blocked {
                        row["blocked"] = json!(true);
                        row["reason"] = json!(decision.reason);
                    }
                    if let Some(health) = health {
                        row["health"] = json!(match health {
                            PackageHealth::Ok => "ok".to_string(),
                            PackageHealth::Unavailable(reason) => format!("unavailable: {}", reason),
                            PackageHealth::Error(reason) => format!("error: {}", reason),
                        });
                    }
                    row
                }
            })
            .buffered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        Ok(json!({
            "packages": rows,
            "count": rows.len(),
            "etag": self.catalog.etag(),
        }))
    }

    /// `list_tools`: paginated, glob-filtered, security-annotated listing.
    async fn list_tools(&self, params: ListToolsParams) -> HandlerResult<Value> {
        let policy = self.policy();
        let pattern = params
            .name_pattern
            .as_deref()
            .map(compile_name_pattern)
            .transpose()?;

        let packages: Vec<PackageDescriptor> = match &params.package_id {
            Some(id) => {
                let descriptor = self
                    .registry
                    .descriptor(id)
                    .await
                    .ok_or_else(|| HandlerError::PackageNotFound { id: id.clone() })?;
                vec![descriptor]
            }
            None => self.visible_packages().await,
        };

        let entries: Vec<(String, supermcp_registry::CatalogEntry)> = stream::iter(packages)
            .map(|descriptor| {
                let registry = self.registry.clone();
                let catalog = self.catalog.clone();
                async move {
                    let entry = catalog.ensure_loaded(&registry, &descriptor.id).await;
                    (descriptor.id, entry)
                }
            })
            .buffered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        let mut tools = Vec::new();
        for (package_id, entry) in &entries {
            for tool in &entry.tools {
                if let Some(pattern) = &pattern {
                    if !pattern.is_match(&tool.namespaced) && !pattern.is_match(&tool.name) {
                        continue;
                    }
                }
                let annotation = policy.annotate_tool(package_id, &tool.name);
                let mut row = serde_json::to_value(tool)
                    .map_err(|e| HandlerError::Internal(e.to_string()))?;
                row["package_id"] = json!(package_id);
                if annotation.blocked {
                    row["blocked"] = json!(true);
                    row["reason"] = json!(annotation.reason);
                    if annotation.user_disabled {
                        row["user_disabled"] = json!(true);
                    }
                }
                tools.push(row);
            }
        }

        let offset = params.cursor.as_deref().map(decode_cursor).transpose()?.unwrap_or(0);
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let total = tools.len();
        let page: Vec<Value> = tools.into_iter().skip(offset).take(limit).collect();
        let next_cursor =
            (offset + page.len() < total).then(|| encode_cursor(offset + page.len()));

        let mut result = json!({
            "tools": page,
            "total": total,
            "etag": self.catalog.etag(),
        });
        if let Some(cursor) = next_cursor {
            result["next_cursor"] = json!(cursor);
        }
        Ok(result)
    }

    /// Resolve `(package_id?, tool_id)` into package and short tool name.
    /// `use_tool("fs__read_file")` and `use_tool(package_id="fs",
    /// tool_id="read_file")` land on the same call.
    fn resolve_tool_id(
        package_id: Option<&str>,
        tool_id: &str,
    ) -> HandlerResult<(String, String)> {
        if let Some(package_id) = package_id {
            let prefix = format!("{}__", package_id);
            let short = tool_id.strip_prefix(&prefix).unwrap_or(tool_id);
            return Ok((package_id.to_string(), short.to_string()));
        }
        match tool_id.split_once("__") {
            Some((package, tool)) if !package.is_empty() && !tool.is_empty() => {
                Ok((package.to_string(), tool.to_string()))
            }
            _ => Err(HandlerError::InvalidParams(
                "tool_id must be namespaced as {package}__{tool} when package_id is omitted"
                    .to_string(),
            )),
        }
    }

    /// `use_tool`: the main request path.
    async fn use_tool(&self, params: UseToolParams) -> HandlerResult<Value> {
        let (package_id, tool_name) =
            Self::resolve_tool_id(params.package_id.as_deref(), &params.tool_id)?;

        let policy = self.policy();
        let package_decision = policy.is_package_blocked(&package_id);
        if package_decision.blocked {
            return Err(HandlerError::ToolBlocked {
                reason: package_decision.reason.unwrap_or_else(|| "blocked".to_string()),
            });
        }
        let annotation = policy.annotate_tool(&package_id, &tool_name);
        if annotation.blocked {
            return Err(HandlerError::ToolBlocked {
                reason: annotation.reason.unwrap_or_else(|| "blocked".to_string()),
            });
        }

        let descriptor = self
            .registry
            .descriptor(&package_id)
            .await
            .ok_or_else(|| HandlerError::PackageNotFound { id: package_id.clone() })?;

        let entry = self.catalog.ensure_loaded(&self.registry, &package_id).await;
        match entry.status {
            CatalogStatus::Ready => {}
            CatalogStatus::AuthRequired => {
                return Err(HandlerError::PackageUnavailable {
                    package: package_id.clone(),
                    reason: format!(
                        "authentication required; run authenticate(\"{}\")",
                        package_id
                    ),
                });
            }
            CatalogStatus::Error => {
                return Err(HandlerError::PackageUnavailable {
                    package: package_id.clone(),
                    reason: entry
                        .last_error
                        .unwrap_or_else(|| "tool list failed".to_string()),
                });
            }
        }

        let tool = entry
            .tools
            .iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| HandlerError::ToolNotFound {
                package: package_id.clone(),
                tool: tool_name.clone(),
            })?;

        // Omitted args mean an empty argument object.
        let args = if params.args.is_null() { json!({}) } else { params.args.clone() };
        let validated = validate_args(&tool.input_schema, &args)?;
        if !validated.stripped.is_empty() {
            tracing::info!(
                package = %package_id,
                tool = %tool_name,
                stripped = ?validated.stripped,
                "stripped unknown top-level arguments"
            );
        }

        if params.dry_run {
            let mut result = json!({
                "dry_run": true,
                "package_id": package_id,
                "tool_id": tool.namespaced,
                "valid": true,
                "args": validated.args,
            });
            if !validated.stripped.is_empty() {
                result["stripped_args"] = json!(validated.stripped);
            }
            return Ok(result);
        }

        // Per-package override, then the environment, then 300 s.
        let timeout = descriptor
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(timeouts::tool_call_timeout);

        let client = self
            .registry
            .get_client(&package_id)
            .await
            .map_err(HandlerError::from)?;
        let output = client
            .call_tool(&tool_name, &validated.args, timeout)
            .await
            .map_err(|e| HandlerError::from_client(&package_id, e))?;

        let mut result = json!({
            "package_id": package_id,
            "tool_id": tool.namespaced,
            "result": output,
        });
        if !validated.stripped.is_empty() {
            result["stripped_args"] = json!(validated.stripped);
        }

        let rendered_len = result["result"].to_string().chars().count();
        match params.max_output_chars {
            Some(max) if rendered_len > max => {
                let rendered = result["result"].to_string();
                let truncated: String = rendered.chars().take(max).collect();
                result["result"] = json!(truncated);
                result["truncation"] = json!({
                    "truncated": true,
                    "original_chars": rendered_len,
                    "returned_chars": max,
                });
                tracing::info!(
                    package = %package_id,
                    tool = %tool_name,
                    original_chars = rendered_len,
                    max_output_chars = max,
                    "tool output truncated"
                );
            }
            None if rendered_len > OUTPUT_WARNING_CHARS => {
                result["warning"] = json!(format!(
                    "output is {} characters; consider passing max_output_chars",
                    rendered_len
                ));
            }
            _ => {}
        }

        Ok(result)
    }

    /// `authenticate`: the full browser OAuth flow.
    async fn authenticate(&self, package_id: String) -> HandlerResult<Value> {
        let descriptor = self
            .registry
            .descriptor(&package_id)
            .await
            .ok_or_else(|| HandlerError::PackageNotFound { id: package_id.clone() })?;
        if descriptor.transport != TransportKind::Http || !descriptor.oauth {
            return Err(HandlerError::InvalidParams(format!(
                "package '{}' does not use OAuth",
                package_id
            )));
        }

        let store = self.registry.credential_store();

        // Reuse the saved callback port when it is still free, otherwise
        // probe for a fresh one; a changed port invalidates stale
        // credentials so registration happens at the right redirect URI.
        let port = match store.saved_callback_port(&package_id) {
            Some(saved) if port_is_free(saved).await => saved,
            _ => find_free_port(DEFAULT_CALLBACK_PORT, DEFAULT_PORT_ATTEMPTS)
                .await
                .map_err(|e| HandlerError::AuthIncomplete { message: e.to_string() })?,
        };
        store.check_and_invalidate_on_port_mismatch(&package_id, port);

        let client = self
            .registry
            .get_client(&package_id)
            .await
            .map_err(HandlerError::from)?;
        let http = client.as_http().ok_or_else(|| {
            HandlerError::InvalidParams(format!("package '{}' is not an HTTP package", package_id))
        })?;
        let provider = http.provider(AuthMode::Interactive).ok_or_else(|| {
            HandlerError::InvalidParams(format!("package '{}' does not use OAuth", package_id))
        })?;

        let request = provider
            .begin_authorization(port)
            .await
            .map_err(|e| HandlerError::AuthIncomplete { message: e.to_string() })?;

        let callback = CallbackServer::bind(port, request.state.clone())
            .await
            .map_err(|e| HandlerError::AuthIncomplete { message: e.to_string() })?;

        if let Err(e) = (self.browser)(request.authorize_url.as_str()) {
            tracing::warn!(error = %e, "failed to launch browser; open the URL manually");
        }
        tracing::info!(package = %package_id, port, "waiting for OAuth callback");

        let code = callback
            .wait(DEFAULT_CALLBACK_TIMEOUT)
            .await
            .map_err(|e| HandlerError::AuthIncomplete { message: e.to_string() })?;

        http.finish_oauth(&code)
            .await
            .map_err(|e| HandlerError::AuthIncomplete { message: e.to_string() })?;
        self.catalog.clear_package(&package_id);

        // Bounded verification; slow upstreams still count as authenticated.
        let status = match tokio::time::timeout(
            AUTH_VERIFY_TIMEOUT,
            self.registry.health_check(&package_id),
        )
        .await
        {
            Ok(PackageHealth::Ok) => "authenticated",
            _ => "authenticated (verification pending)",
        };

        tracing::info!(package = %package_id, status, "OAuth flow finished");
        Ok(json!({
            "status": status,
            "package_id": package_id,
            "callback_port": port,
        }))
    }

    /// `restart_package`: delegate to the registry, then clear the catalog.
    async fn restart_package(&self, package_id: String) -> HandlerResult<Value> {
        let outcome = self
            .registry
            .restart_package(&package_id)
            .await
            .map_err(HandlerError::from)?;
        self.catalog.clear_package(&package_id);

        Ok(match outcome {
            RestartOutcome::Restarted => json!({
                "restarted": true,
                "package_id": package_id,
            }),
            RestartOutcome::RemovedInvalid { reason } => json!({
                "restarted": false,
                "package_id": package_id,
                "reason": reason,
            }),
        })
    }

    /// `health_check`: one package, with catalog synchronization.
    async fn health_check(&self, package_id: String) -> HandlerResult<Value> {
        if self.registry.descriptor(&package_id).await.is_none() {
            return Err(HandlerError::PackageNotFound { id: package_id });
        }
        let health = self.registry.health_check(&package_id).await;
        if health == PackageHealth::Ok {
            self.catalog.clear_if_not_ready(&package_id);
        }
        Ok(health_row(&package_id, health))
    }

    /// `health_check_all`: bounded fan-out over every package.
    async fn health_check_all(&self) -> HandlerResult<Value> {
        let packages = self.registry.packages().await;
        let registry = self.registry.clone();
        let catalog = self.catalog.clone();
        let rows: Vec<Value> = stream::iter(packages)
            .map(|descriptor| {
                let registry = registry.clone();
                let catalog = catalog.clone();
                async move {
                    let health = registry.health_check(&descriptor.id).await;
                    if health == PackageHealth::Ok {
                        catalog.clear_if_not_ready(&descriptor.id);
                    }
                    health_row(&descriptor.id, health)
                }
            })
            .buffered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        Ok(json!({ "packages": rows }))
    }

    /// `search_tools`: BM25 over the catalog, index keyed by the ETag.
    async fn search_tools(&self, params: SearchParams) -> HandlerResult<Value> {
        let policy = self.policy();

        // Make sure every visible package has had a load attempt before
        // the index snapshot.
        let packages = self.visible_packages().await;
        let registry = self.registry.clone();
        let catalog = self.catalog.clone();
        stream::iter(packages)
            .map(|descriptor| {
                let registry = registry.clone();
                let catalog = catalog.clone();
                async move { catalog.ensure_loaded(&registry, &descriptor.id).await }
            })
            .buffered(FANOUT_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let etag = self.catalog.etag();
        let limit = params.limit.unwrap_or(10).min(50);
        let hits = {
            let mut guard = self.search_index.lock().expect("search index lock");
            let stale = guard.as_ref().map(|i| !i.is_current(&etag)).unwrap_or(true);
            if stale {
                *guard = Some(SearchIndex::build(etag.clone(), self.catalog.all_ready_tools()));
            }
            guard.as_ref().expect("index present").search(&params.query, limit)
        };

        let results: Vec<Value> = hits
            .into_iter()
            .map(|hit| {
                let annotation = policy.annotate_tool(&hit.package_id, &hit.tool.name);
                let mut row = json!({
                    "package_id": hit.package_id,
                    "tool_id": hit.tool.namespaced,
                    "summary": hit.tool.summary,
                    "score": (hit.score * 1000.0).round() / 1000.0,
                });
                if annotation.blocked {
                    row["blocked"] = json!(true);
                    row["reason"] = json!(annotation.reason);
                    if annotation.user_disabled {
                        row["user_disabled"] = json!(true);
                    }
                }
                row
            })
            .collect();

        Ok(json!({
            "results": results,
            "etag": etag,
        }))
    }

    /// `read_resource`: resolve the owning package and forward.
    async fn read_resource(&self, params: ReadResourceParams) -> HandlerResult<Value> {
        let package_id = self
            .catalog
            .resolve_resource(&params.uri)
            .ok_or_else(|| HandlerError::ResourceNotFound { uri: params.uri.clone() })?;

        if self.registry.descriptor(&package_id).await.is_none() {
            return Err(HandlerError::ResourceNotFound { uri: params.uri });
        }

        let decision = self.policy().is_package_blocked(&package_id);
        if decision.blocked {
            return Err(HandlerError::ToolBlocked {
                reason: decision.reason.unwrap_or_else(|| "blocked".to_string()),
            });
        }

        let client = self
            .registry
            .get_client(&package_id)
            .await
            .map_err(HandlerError::from)?;
        match client.read_resource(&params.uri).await {
            Ok(contents) => {
                // A successful read proves the package healthy.
                self.catalog.clear_if_not_ready(&package_id);
                Ok(json!({
                    "package_id": package_id,
                    "uri": params.uri,
                    "contents": contents,
                }))
            }
            Err(ClientError::Rpc { code: -32601, .. }) => {
                Err(HandlerError::CapabilityNotSupported {
                    package: package_id,
                    capability: "resources/read".to_string(),
                })
            }
            Err(e) => Err(HandlerError::from_client(&package_id, e)),
        }
    }

    /// `get_help`: static topics assembled around the live package list.
    async fn get_help(&self, params: HelpParams) -> HandlerResult<Value> {
        let packages = self.visible_packages().await;
        help::render(params.topic.as_deref(), &packages)
    }

    /// Bulk tool export for `GET /api/tools`: every visible package's
    /// annotated tools plus the combined ETag.
    pub async fn export_tools(&self) -> (Value, String) {
        let policy = self.policy();
        let packages = self.visible_packages().await;

        let registry = self.registry.clone();
        let catalog = self.catalog.clone();
        stream::iter(&packages)
            .map(|descriptor| {
                let registry = registry.clone();
                let catalog = catalog.clone();
                async move { catalog.ensure_loaded(&registry, &descriptor.id).await }.boxed()
            })
            .buffered(FANOUT_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let mut tools = Vec::new();
        for descriptor in &packages {
            let Some(entry) = self.catalog.entry(&descriptor.id) else { continue };
            for tool in &entry.tools {
                let annotation = policy.annotate_tool(&descriptor.id, &tool.name);
                let mut row = serde_json::to_value(tool).unwrap_or_else(|_| json!({}));
                row["package_id"] = json!(descriptor.id);
                row["blocked"] = json!(annotation.blocked);
                if let Some(reason) = annotation.reason {
                    row["reason"] = json!(reason);
                }
                if annotation.user_disabled {
                    row["user_disabled"] = json!(true);
                }
                tools.push(row);
            }
        }

        // The published ETag folds the user-disabled hash in so overlay
        // changes invalidate consumers even when the catalog is unchanged.
        let etag = format!("{}-{}", self.catalog.etag(), policy.disabled_hash());
        (json!({ "tools": tools, "etag": etag }), etag)
    }
}

fn health_row(package_id: &str, health: PackageHealth) -> Value {
    match health {
        PackageHealth::Ok => json!({"package_id": package_id, "status": "ok"}),
        PackageHealth::Unavailable(reason) => {
            json!({"package_id": package_id, "status": "unavailable", "error": reason})
        }
        PackageHealth::Error(reason) => {
            json!({"package_id": package_id, "status": "error", "error": reason})
        }
    }
}

//! Tool catalog
//!
//! Per-package tool list cache with authentication-aware states. Entries in
//! a non-ready state are retried no more often than the error-retry
//! interval; any operation that proves a package healthy clears its entry
//! so stale `error`/`auth_required` caches cannot linger. A process-wide
//! ETag moves whenever any entry changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use supermcp_client::ToolDef;

use crate::error::RegistryError;
use crate::registry::PackageRegistry;

/// Entries in a non-ready state become eligible for refresh after this
/// interval.
pub const ERROR_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Load state of one package's tool list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Ready,
    AuthRequired,
    Error,
}

/// One cached tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogTool {
    /// Short name as the upstream advertises it
    pub name: String,
    /// Namespaced id `{pkg}__{tool}`, unique across packages
    pub namespaced: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
    /// Content hash of the input schema
    pub schema_hash: String,
    /// One-line summary for agent hints
    pub summary: String,
    /// Skeleton of the arguments object, typed placeholders per property
    pub args_skeleton: Value,
}

/// One package's cache entry
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub status: CatalogStatus,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub etag: String,
    pub tools: Vec<CatalogTool>,
    #[serde(skip)]
    loaded_at: Instant,
}

impl CatalogEntry {
    fn retryable(&self, interval: Duration) -> bool {
        self.status != CatalogStatus::Ready && self.loaded_at.elapsed() >= interval
    }
}

struct CatalogInner {
    entries: HashMap<String, CatalogEntry>,
    /// `scheme://authority` prefix → owning package id
    resource_prefixes: HashMap<String, String>,
    etag: String,
}

/// The process-wide tool catalog
pub struct ToolCatalog {
    inner: StdMutex<CatalogInner>,
    retry_interval: Duration,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::with_retry_interval(ERROR_RETRY_INTERVAL)
    }

    pub fn with_retry_interval(retry_interval: Duration) -> Self {
        Self {
            inner: StdMutex::new(CatalogInner {
                entries: HashMap::new(),
                resource_prefixes: HashMap::new(),
                etag: String::from("empty"),
            }),
            retry_interval,
        }
    }

    /// Current process-wide ETag
    pub fn etag(&self) -> String {
        self.inner.lock().expect("catalog lock").etag.clone()
    }

    /// The cached entry, if any
    pub fn entry(&self, package_id: &str) -> Option<CatalogEntry> {
        self.inner
            .lock()
            .expect("catalog lock")
            .entries
            .get(package_id)
            .cloned()
    }

    /// Load the package's tool list on demand, consulting the cache.
    ///
    /// Failures are classified: auth-shaped errors produce an
    /// `auth_required` entry, everything else an `error` entry; both carry
    /// an empty tool list and are retried no more often than the retry
    /// interval.
    pub async fn ensure_loaded(
        &self,
        registry: &PackageRegistry,
        package_id: &str,
    ) -> CatalogEntry {
        {
            let inner = self.inner.lock().expect("catalog lock");
            if let Some(entry) = inner.entries.get(package_id) {
                if entry.status == CatalogStatus::Ready || !entry.retryable(self.retry_interval) {
                    return entry.clone();
                }
            }
        }

        let loaded = self.load(registry, package_id).await;
        self.install(package_id, loaded)
    }

    async fn load(&self, registry: &PackageRegistry, package_id: &str) -> CatalogEntry {
        let result: Result<Vec<ToolDef>, RegistryError> = async {
            let client = registry.get_client(package_id).await?;
            Ok(client.list_tools().await?)
        }
        .await;

        match result {
            Ok(tools) => {
                let catalog_tools: Vec<CatalogTool> = tools
                    .iter()
                    .map(|tool| build_tool(package_id, tool))
                    .collect();
                self.register_resource_prefixes(package_id, &tools);
                entry_with(CatalogStatus::Ready, None, catalog_tools)
            }
            Err(e) if e.is_auth_shaped() => {
                tracing::info!(package = package_id, error = %e, "tool list requires authentication");
                entry_with(CatalogStatus::AuthRequired, Some(e.to_string()), Vec::new())
            }
            Err(e) => {
                tracing::warn!(package = package_id, error = %e, "tool list failed");
                entry_with(CatalogStatus::Error, Some(e.to_string()), Vec::new())
            }
        }
    }

    fn install(&self, package_id: &str, entry: CatalogEntry) -> CatalogEntry {
        let mut inner = self.inner.lock().expect("catalog lock");
        inner.entries.insert(package_id.to_string(), entry.clone());
        inner.recompute_etag();
        entry
    }

    /// Drop the package's entry. Called after any operation that proves the
    /// package healthy (list ok, health ok, resource read, authentication,
    /// restart) so the next listing reloads fresh.
    pub fn clear_package(&self, package_id: &str) {
        let mut inner = self.inner.lock().expect("catalog lock");
        let removed = inner.entries.remove(package_id).is_some();
        inner
            .resource_prefixes
            .retain(|_, owner| owner != package_id);
        if removed {
            inner.recompute_etag();
            tracing::debug!(package = package_id, "catalog entry cleared");
        }
    }

    /// Drop only stale non-ready entries; used after a health check proves
    /// the package reachable.
    pub fn clear_if_not_ready(&self, package_id: &str) {
        let should_clear = self
            .entry(package_id)
            .map(|e| e.status != CatalogStatus::Ready)
            .unwrap_or(false);
        if should_clear {
            self.clear_package(package_id);
        }
    }

    fn register_resource_prefixes(&self, package_id: &str, tools: &[ToolDef]) {
        let mut prefixes = Vec::new();
        for tool in tools {
            let Some(meta) = &tool.meta else { continue };
            collect_resource_prefixes(meta, &mut prefixes);
        }
        if prefixes.is_empty() {
            return;
        }

        let mut inner = self.inner.lock().expect("catalog lock");
        for prefix in prefixes {
            tracing::debug!(package = package_id, prefix = %prefix, "registered resource prefix");
            inner.resource_prefixes.insert(prefix, package_id.to_string());
        }
    }

    /// Resolve a resource URI to its owning package: first via the
    /// registered prefix table, then via the structured `ui://{pkg}/...`
    /// fallback.
    pub fn resolve_resource(&self, uri: &str) -> Option<String> {
        let parsed = url::Url::parse(uri).ok()?;
        let authority = parsed.host_str()?;
        let prefix = format!("{}://{}", parsed.scheme(), authority);

        let inner = self.inner.lock().expect("catalog lock");
        if let Some(owner) = inner.resource_prefixes.get(&prefix) {
            return Some(owner.clone());
        }
        drop(inner);

        (parsed.scheme() == "ui").then(|| authority.to_string())
    }

    /// All ready tools across packages, for search and bulk export
    pub fn all_ready_tools(&self) -> Vec<(String, CatalogTool)> {
        let inner = self.inner.lock().expect("catalog lock");
        inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.status == CatalogStatus::Ready)
            .flat_map(|(id, entry)| {
                entry.tools.iter().cloned().map(move |tool| (id.clone(), tool))
            })
            .collect()
    }
}

impl CatalogInner {
    /// ETag over the timestamps plus the sorted key set.
    fn recompute_etag(&mut self) {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        let mut hasher = Sha256::new();
        for key in keys {
            let entry = &self.entries[key];
            hasher.update(key.as_bytes());
            hasher.update(entry.etag.as_bytes());
            hasher.update(entry.last_updated.timestamp_micros().to_le_bytes());
        }
        let digest = hasher.finalize();
        self.etag = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    }
}

fn entry_with(
    status: CatalogStatus,
    last_error: Option<String>,
    tools: Vec<CatalogTool>,
) -> CatalogEntry {
    let mut hasher = Sha256::new();
    for tool in &tools {
        hasher.update(tool.namespaced.as_bytes());
        hasher.update(tool.schema_hash.as_bytes());
    }
    let digest = hasher.finalize();

    CatalogEntry {
        status,
        last_updated: Utc::now(),
        last_error,
        etag: digest.iter().take(8).map(|b| format!("{:02x}", b)).collect(),
        tools,
        loaded_at: Instant::now(),
    }
}

fn build_tool(package_id: &str, tool: &ToolDef) -> CatalogTool {
    CatalogTool {
        name: tool.name.clone(),
        namespaced: format!("{}__{}", package_id, tool.name),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
        schema_hash: schema_hash(&tool.input_schema),
        summary: summarize(tool),
        args_skeleton: args_skeleton(&tool.input_schema),
    }
}

fn schema_hash(schema: &Value) -> String {
    let canonical = canonical_json(schema);
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

/// Serialize with object keys sorted so the hash is stable regardless of
/// the order the upstream emitted them.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let fields: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", fields.join(","))
        }
        other => other.to_string(),
    }
}

fn summarize(tool: &ToolDef) -> String {
    let text = tool
        .description
        .as_deref()
        .unwrap_or(&tool.name)
        .lines()
        .next()
        .unwrap_or("")
        .trim();
    if text.chars().count() > 100 {
        let cut: String = text.chars().take(97).collect();
        format!("{}...", cut.trim_end())
    } else {
        text.to_string()
    }
}

fn args_skeleton(schema: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Value::Object(serde_json::Map::new());
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut skeleton = serde_json::Map::new();
    for (name, prop) in properties {
        let type_name = prop.get("type").and_then(|t| t.as_str()).unwrap_or("any");
        let marker = if required.contains(&name.as_str()) {
            format!("<{}>", type_name)
        } else {
            format!("<{}?>", type_name)
        };
        skeleton.insert(name.clone(), Value::String(marker));
    }
    Value::Object(skeleton)
}

fn collect_resource_prefixes(meta: &Value, prefixes: &mut Vec<String>) {
    match meta {
        Value::String(s) => {
            if let Ok(parsed) = url::Url::parse(s) {
                if !matches!(parsed.scheme(), "http" | "https") {
                    if let Some(host) = parsed.host_str() {
                        prefixes.push(format!("{}://{}", parsed.scheme(), host));
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_resource_prefixes(item, prefixes);
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                collect_resource_prefixes(value, prefixes);
            }
        }
        _ => {}
    }
}

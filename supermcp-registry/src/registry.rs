//! Package registry
//!
//! Owns the descriptors, the lazily created clients, the single-flight
//! connect coalescing, the per-package last-activity clock, and the idle
//! reaper. All map mutations happen behind one async mutex taken briefly
//! around lookup-and-insert; the single-flight pattern relies on that
//! atomicity.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use supermcp_auth::CredentialStore;
use supermcp_client::{timeouts, ClientError, Health, McpClient};
use supermcp_config::{normalize_entry, LoadedConfig, PackageDescriptor, SkippedPackage, TransportKind};

use crate::error::{RegistryError, RegistryResult};

/// Interval between idle-reaper sweeps
pub const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Health of a package at the registry boundary. The HTTP client's
/// needs-auth state maps onto `Unavailable` here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageHealth {
    Ok,
    Unavailable(String),
    Error(String),
}

/// Outcome of a restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// The descriptor re-validated and the package will reconnect lazily
    Restarted,
    /// The refreshed raw entry no longer validates; the package was removed
    RemovedInvalid { reason: String },
}

type SharedConnect = Shared<BoxFuture<'static, Result<Arc<McpClient>, Arc<ClientError>>>>;

struct RegistryInner {
    /// Descriptors in merged-config order
    packages: Vec<PackageDescriptor>,
    /// Raw config entries, kept for restart re-normalization
    raw_servers: serde_json::Map<String, serde_json::Value>,
    clients: HashMap<String, Arc<McpClient>>,
    inflight: HashMap<String, SharedConnect>,
    /// Stdio only; drives the idle reaper
    last_activity: HashMap<String, Instant>,
    skipped: Vec<SkippedPackage>,
}

/// The package registry
pub struct PackageRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    store: Arc<CredentialStore>,
    reaper: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PackageRegistry {
    pub fn new(config: LoadedConfig, store: Arc<CredentialStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                packages: config.packages,
                raw_servers: config.raw_servers,
                clients: HashMap::new(),
                inflight: HashMap::new(),
                last_activity: HashMap::new(),
                skipped: config.skipped,
            })),
            store,
            reaper: StdMutex::new(None),
        }
    }

    pub fn credential_store(&self) -> Arc<CredentialStore> {
        self.store.clone()
    }

    /// Descriptors in merged-config order
    pub async fn packages(&self) -> Vec<PackageDescriptor> {
        self.inner.lock().await.packages.clone()
    }

    pub async fn descriptor(&self, id: &str) -> Option<PackageDescriptor> {
        let inner = self.inner.lock().await;
        inner.packages.iter().find(|p| p.id == id).cloned()
    }

    /// Entries that failed validation at load time
    pub async fn skipped(&self) -> Vec<SkippedPackage> {
        self.inner.lock().await.skipped.clone()
    }

    /// Whether a client currently exists for the package (test hook and
    /// reaper observability; does not connect).
    pub async fn has_client(&self, id: &str) -> bool {
        self.inner.lock().await.clients.contains_key(id)
    }

    /// Get or lazily create the package's client.
    ///
    /// Fast path returns an existing client. A client reporting error
    /// health is discarded and rebuilt; a needs-auth client is returned
    /// as-is so authentication stays an explicit user action. Concurrent
    /// callers while no client exists coalesce onto one connect attempt
    /// and share the resulting client.
    pub async fn get_client(&self, id: &str) -> RegistryResult<Arc<McpClient>> {
        if let Some(existing) = { self.inner.lock().await.clients.get(id).cloned() } {
            match existing.health_check().await {
                Health::Ok | Health::NeedsAuth => {
                    self.touch(id, &existing).await;
                    return Ok(existing);
                }
                Health::Error(message) => {
                    tracing::info!(package = id, %message, "discarding unhealthy client");
                    let mut inner = self.inner.lock().await;
                    inner.clients.remove(id);
                    inner.last_activity.remove(id);
                    drop(inner);
                    existing.close().await;
                }
            }
        }

        let connect = {
            let mut inner = self.inner.lock().await;
            if let Some(inflight) = inner.inflight.get(id) {
                inflight.clone()
            } else {
                let descriptor = inner
                    .packages
                    .iter()
                    .find(|p| p.id == id)
                    .cloned()
                    .ok_or_else(|| RegistryError::PackageNotFound { id: id.to_string() })?;

                let connect = self.spawn_connect(descriptor);
                inner.inflight.insert(id.to_string(), connect.clone());
                connect
            }
        };

        connect.await.map_err(|e| RegistryError::Connect {
            id: id.to_string(),
            message: e.to_string(),
        })
    }

    /// Spawn the single connect task for a package. Must be called with the
    /// inner lock held so the task cannot clear its inflight entry before
    /// it is inserted.
    fn spawn_connect(&self, descriptor: PackageDescriptor) -> SharedConnect {
        let id = descriptor.id.clone();
        let is_stdio = descriptor.transport == TransportKind::Stdio;
        let store = self.store.clone();
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let result: Result<Arc<McpClient>, Arc<ClientError>> = async {
                let client = McpClient::for_descriptor(descriptor, store).map_err(Arc::new)?;
                match client.connect().await {
                    Ok(()) => {}
                    Err(e) if client.connect_failure_is_auth(&e) => {
                        // Keep the unconnected client; its health check
                        // reports needs-auth until the user authenticates.
                        tracing::info!(package = %client.package_id(), error = %e, "package requires authentication");
                    }
                    Err(e) => return Err(Arc::new(e)),
                }
                Ok(Arc::new(client))
            }
            .await;

            // Finally-equivalent scope: record the outcome and clear the
            // inflight entry whether connect succeeded or failed.
            let mut inner = inner.lock().await;
            if let Ok(client) = &result {
                inner.clients.insert(id.clone(), client.clone());
                if is_stdio {
                    inner.last_activity.insert(id.clone(), Instant::now());
                }
            }
            inner.inflight.remove(&id);
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(ClientError::Transport {
                    message: format!("connect task failed: {}", e),
                })),
            }
        }
        .boxed()
        .shared()
    }

    async fn touch(&self, id: &str, client: &McpClient) {
        if client.transport() == TransportKind::Stdio {
            self.inner
                .lock()
                .await
                .last_activity
                .insert(id.to_string(), Instant::now());
        }
    }

    /// Health of one package, connecting lazily if needed
    pub async fn health_check(&self, id: &str) -> PackageHealth {
        match self.get_client(id).await {
            Ok(client) => match client.health_check().await {
                Health::Ok => PackageHealth::Ok,
                Health::NeedsAuth => PackageHealth::Unavailable(format!(
                    "authentication required; run authenticate(\"{}\")",
                    id
                )),
                Health::Error(message) => PackageHealth::Error(message),
            },
            Err(RegistryError::PackageNotFound { id }) => {
                PackageHealth::Error(format!("package '{}' not found", id))
            }
            Err(e) if e.is_auth_shaped() => PackageHealth::Unavailable(e.to_string()),
            Err(e) => PackageHealth::Error(e.to_string()),
        }
    }

    /// Restart a package: await any in-flight connect, close the client,
    /// re-normalize the descriptor from raw config (picking up environment
    /// variable changes), and re-validate it.
    pub async fn restart_package(&self, id: &str) -> RegistryResult<RestartOutcome> {
        let inflight = { self.inner.lock().await.inflight.get(id).cloned() };
        if let Some(inflight) = inflight {
            let _ = inflight.await;
        }

        let (client, raw) = {
            let mut inner = self.inner.lock().await;
            let raw = inner.raw_servers.get(id).cloned();
            if raw.is_none() && !inner.packages.iter().any(|p| p.id == id) {
                return Err(RegistryError::PackageNotFound { id: id.to_string() });
            }
            let client = inner.clients.remove(id);
            inner.last_activity.remove(id);
            (client, raw)
        };
        if let Some(client) = client {
            client.close().await;
        }

        let Some(raw) = raw else {
            return Err(RegistryError::PackageNotFound { id: id.to_string() });
        };

        let mut inner = self.inner.lock().await;
        inner.skipped.retain(|s| s.id != id);
        match normalize_entry(id, &raw) {
            Ok(normalized) => {
                match inner.packages.iter_mut().find(|p| p.id == id) {
                    Some(slot) => *slot = normalized.descriptor,
                    None => inner.packages.push(normalized.descriptor),
                }
                tracing::info!(package = id, "package restarted");
                Ok(RestartOutcome::Restarted)
            }
            Err(reason) => {
                inner.packages.retain(|p| p.id != id);
                inner.skipped.push(SkippedPackage {
                    id: id.to_string(),
                    reason: reason.clone(),
                });
                tracing::warn!(package = id, %reason, "package removed on restart; descriptor no longer validates");
                Ok(RestartOutcome::RemovedInvalid { reason })
            }
        }
    }

    /// Start the periodic idle sweep. Stdio clients idle beyond the
    /// threshold are closed; HTTP clients, busy clients and clients with an
    /// in-flight connect are never reaped.
    pub fn start_reaper(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else { break };
                registry.sweep_idle().await;
            }
        });

        let mut reaper = self.reaper.lock().expect("reaper lock");
        if let Some(old) = reaper.replace(handle) {
            old.abort();
        }
    }

    /// One reaper sweep; public for tests.
    pub async fn sweep_idle(&self) {
        let Some(threshold) = timeouts::idle_timeout() else {
            return;
        };

        let victims: Vec<(String, Arc<McpClient>)> = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            let idle_ids: Vec<String> = inner
                .last_activity
                .iter()
                .filter(|(id, last)| {
                    now.duration_since(**last) > threshold
                        && !inner.inflight.contains_key(*id)
                        && inner
                            .clients
                            .get(*id)
                            .map(|c| {
                                c.transport() == TransportKind::Stdio && !c.has_pending_requests()
                            })
                            .unwrap_or(false)
                })
                .map(|(id, _)| id.clone())
                .collect();

            // Remove from the maps before closing so the client is gone
            // even if close fails.
            idle_ids
                .into_iter()
                .filter_map(|id| {
                    inner.last_activity.remove(&id);
                    inner.clients.remove(&id).map(|client| (id, client))
                })
                .collect()
        };

        for (id, client) in victims {
            tracing::info!(package = %id, "reaping idle stdio package");
            client.close().await;
        }
    }

    /// Test hook: backdate a package's last activity.
    pub async fn set_last_activity(&self, id: &str, ago: Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(instant) = Instant::now().checked_sub(ago) {
            inner.last_activity.insert(id.to_string(), instant);
        }
    }

    /// Stop the reaper and close every client.
    pub async fn close_all(&self) {
        if let Some(handle) = self.reaper.lock().expect("reaper lock").take() {
            handle.abort();
        }

        let inflight: Vec<SharedConnect> = {
            self.inner.lock().await.inflight.values().cloned().collect()
        };
        for connect in inflight {
            let _ = connect.await;
        }

        let clients: Vec<Arc<McpClient>> = {
            let mut inner = self.inner.lock().await;
            inner.last_activity.clear();
            inner.clients.drain().map(|(_, client)| client).collect()
        };
        for client in clients {
            client.close().await;
        }
        tracing::info!("registry closed");
    }

    /// Swap in a reloaded configuration. Clients of packages that
    /// disappeared are closed; survivors keep running until restarted.
    pub async fn apply_config(&self, config: LoadedConfig) {
        let stale: Vec<Arc<McpClient>> = {
            let mut inner = self.inner.lock().await;
            inner.packages = config.packages;
            inner.raw_servers = config.raw_servers;
            inner.skipped = config.skipped;

            let live: std::collections::HashSet<String> =
                inner.packages.iter().map(|p| p.id.clone()).collect();
            let stale_ids: Vec<String> = inner
                .clients
                .keys()
                .filter(|id| !live.contains(*id))
                .cloned()
                .collect();
            stale_ids
                .into_iter()
                .filter_map(|id| {
                    inner.last_activity.remove(&id);
                    inner.clients.remove(&id)
                })
                .collect()
        };
        for client in stale {
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use supermcp_config::ConfigLoader;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn registry_from(content: &str) -> (TempDir, Arc<PackageRegistry>) {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, content);
        let config = ConfigLoader::new().load(&[path]).unwrap();
        let store = Arc::new(CredentialStore::with_root(dir.path().join("tokens")));
        (dir, Arc::new(PackageRegistry::new(config, store)))
    }

    #[tokio::test]
    async fn test_duplicate_ids_resolve_to_single_package() {
        // Two definitions of "fs" across documents: later wins, none skipped.
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        std::fs::write(&first, r#"{"mcpServers": {"fs": {"command": "echo"}}}"#).unwrap();
        std::fs::write(&second, r#"{"mcpServers": {"fs": {"command": "cat"}}}"#).unwrap();

        let config = ConfigLoader::new().load(&[first, second]).unwrap();
        let store = Arc::new(CredentialStore::with_root(dir.path().join("tokens")));
        let registry = PackageRegistry::new(config, store);

        let packages = registry.packages().await;
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].id, "fs");
        assert_eq!(packages[0].command.as_deref(), Some("cat"));
        assert!(registry.skipped().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_package_is_skipped_not_registered() {
        let (_dir, registry) =
            registry_from(r#"{"mcpServers": {"x": {"type": "http", "url": "not a url"}}}"#).await;

        assert!(registry.descriptor("x").await.is_none());
        let skipped = registry.skipped().await;
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].id, "x");
        assert_eq!(skipped[0].reason, "base_url must be a valid URL, got \"not a url\"");

        let err = registry.get_client("x").await.unwrap_err();
        assert!(matches!(err, RegistryError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_package_not_found() {
        let (_dir, registry) = registry_from(r#"{"mcpServers": {}}"#).await;
        let err = registry.get_client("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_single_flight_connect_shares_one_client() {
        let (_dir, registry) =
            registry_from(r#"{"mcpServers": {"cat": {"command": "cat"}}}"#).await;

        // `cat` answers nothing, so initialize would hang; shorten it.
        std::env::set_var("SUPER_MCP_CONNECT_TIMEOUT_MS", "400");
        let a = registry.clone();
        let b = registry.clone();
        let (ra, rb) = tokio::join!(a.get_client("cat"), b.get_client("cat"));
        std::env::remove_var("SUPER_MCP_CONNECT_TIMEOUT_MS");

        // Both callers observed the same single connect attempt outcome.
        match (ra, rb) {
            (Ok(ca), Ok(cb)) => assert!(Arc::ptr_eq(&ca, &cb)),
            (Err(ea), Err(eb)) => assert_eq!(ea.to_string(), eb.to_string()),
            other => panic!("callers diverged: {:?}", other.0.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_restart_of_unknown_package_errors() {
        let (_dir, registry) = registry_from(r#"{"mcpServers": {}}"#).await;
        let err = registry.restart_package("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_restart_picks_up_env_changes() {
        let (_dir, registry) = registry_from(
            r#"{"mcpServers": {"dyn": {"command": "echo", "args": ["${SMCP_RESTART_ARG}"]}}}"#,
        )
        .await;

        std::env::set_var("SMCP_RESTART_ARG", "first");
        registry.restart_package("dyn").await.unwrap();
        assert_eq!(registry.descriptor("dyn").await.unwrap().args, vec!["first"]);

        std::env::set_var("SMCP_RESTART_ARG", "second");
        registry.restart_package("dyn").await.unwrap();
        assert_eq!(registry.descriptor("dyn").await.unwrap().args, vec!["second"]);
        std::env::remove_var("SMCP_RESTART_ARG");
    }

    #[tokio::test]
    async fn test_restart_removes_newly_invalid_descriptor() {
        let (_dir, registry) = registry_from(
            r#"{"mcpServers": {"dyn": {"command": "${SMCP_RESTART_CMD}"}}}"#,
        )
        .await;

        std::env::remove_var("SMCP_RESTART_CMD");
        let outcome = registry.restart_package("dyn").await.unwrap();
        assert!(matches!(outcome, RestartOutcome::RemovedInvalid { .. }));
        assert!(registry.descriptor("dyn").await.is_none());
        assert_eq!(registry.skipped().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_never_reaps_busy_or_missing() {
        let (_dir, registry) = registry_from(r#"{"mcpServers": {"fs": {"command": "cat"}}}"#).await;

        // Nothing connected yet; a sweep with a backdated clock must not panic
        // or invent clients.
        registry.set_last_activity("fs", Duration::from_secs(10_000)).await;
        registry.sweep_idle().await;
        assert!(!registry.has_client("fs").await);
    }
}

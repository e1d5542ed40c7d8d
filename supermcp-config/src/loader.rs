//! Configuration loading and merging
//!
//! Documents are JSON. Loading is recursive through the optional
//! `configPaths` field with cycle detection by canonical path and a nesting
//! depth cap. Merging is deterministic: root paths in the order supplied,
//! then references in the order they appear, depth-first; a later definition
//! of a package id overrides an earlier one (with a warning) while keeping
//! its original position in the iteration order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::descriptor::{normalize_entry, PackageDescriptor, SkippedPackage};
use crate::error::{ConfigError, ConfigResult};

/// Maximum `configPaths` nesting depth
pub const MAX_CONFIG_DEPTH: usize = 20;

/// Security section of the merged configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub blocked_tools: Vec<String>,
    pub blocked_packages: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub allowed_packages: Vec<String>,
    pub log_blocked_attempts: Option<bool>,
}

impl SecurityConfig {
    fn merge_from(&mut self, other: SecurityConfig) {
        self.blocked_tools.extend(other.blocked_tools);
        self.blocked_packages.extend(other.blocked_packages);
        self.allowed_tools.extend(other.allowed_tools);
        self.allowed_packages.extend(other.allowed_packages);
        if other.log_blocked_attempts.is_some() {
            self.log_blocked_attempts = other.log_blocked_attempts;
        }
    }
}

/// Fully merged and validated configuration
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Valid packages in merged-config order
    pub packages: Vec<PackageDescriptor>,

    /// Raw entries by id, kept so a restart can re-normalize a single
    /// package and observe current environment variables
    pub raw_servers: serde_json::Map<String, serde_json::Value>,

    /// Merged security section
    pub security: SecurityConfig,

    /// Per-server sets of user-disabled short tool names
    pub user_disabled: HashMap<String, BTreeSet<String>>,

    /// Servers removed from routing by the user
    pub disabled_servers: BTreeSet<String>,

    /// Entries that failed validation, with reasons
    pub skipped: Vec<SkippedPackage>,
}

impl LoadedConfig {
    /// Look up the raw entry for a package id
    pub fn raw_entry(&self, id: &str) -> Option<&serde_json::Value> {
        self.raw_servers.get(id)
    }
}

/// Top-level keys that are options rather than legacy package entries
const RESERVED_KEYS: [&str; 6] = [
    "mcpServers",
    "packages",
    "configPaths",
    "security",
    "userDisabledToolsByServer",
    "disabledServers",
];

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and merge an ordered list of root config paths
    pub fn load(&self, roots: &[PathBuf]) -> ConfigResult<LoadedConfig> {
        let mut state = MergeState::default();
        let mut loading = Vec::new();

        for root in roots {
            self.load_document(root, 0, &mut loading, &mut state)?;
        }

        Ok(state.finish())
    }

    fn load_document(
        &self,
        path: &Path,
        depth: usize,
        loading: &mut Vec<PathBuf>,
        state: &mut MergeState,
    ) -> ConfigResult<()> {
        if depth > MAX_CONFIG_DEPTH {
            return Err(ConfigError::DepthExceeded {
                max_depth: MAX_CONFIG_DEPTH,
            });
        }

        let canonical = path
            .canonicalize()
            .map_err(|source| ConfigError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;

        if loading.contains(&canonical) {
            return Err(ConfigError::CircularReference { path: canonical });
        }

        let content = std::fs::read_to_string(&canonical).map_err(|source| ConfigError::FileRead {
            path: canonical.clone(),
            source,
        })?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: canonical.clone(),
                source,
            })?;
        let object = document.as_object().ok_or_else(|| ConfigError::NotAnObject {
            path: canonical.clone(),
        })?;

        tracing::debug!(path = %canonical.display(), depth, "loading config document");
        state.merge_document(object, &canonical);

        // References load after the document's own entries, depth-first, in
        // the order they appear; a referenced definition therefore overrides
        // this document's.
        let references: Vec<PathBuf> = object
            .get("configPaths")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| resolve_relative(&canonical, s))
                    .collect()
            })
            .unwrap_or_default();

        loading.push(canonical);
        for reference in &references {
            self.load_document(reference, depth + 1, loading, state)?;
        }
        loading.pop();

        Ok(())
    }
}

fn resolve_relative(origin: &Path, reference: &str) -> PathBuf {
    let candidate = PathBuf::from(reference);
    if candidate.is_absolute() {
        candidate
    } else {
        origin.parent().map(|p| p.join(&candidate)).unwrap_or(candidate)
    }
}

#[derive(Default)]
struct MergeState {
    raw_servers: serde_json::Map<String, serde_json::Value>,
    security: SecurityConfig,
    user_disabled: HashMap<String, BTreeSet<String>>,
    disabled_servers: BTreeSet<String>,
    skipped: Vec<SkippedPackage>,
}

impl MergeState {
    fn merge_document(&mut self, object: &serde_json::Map<String, serde_json::Value>, path: &Path) {
        // Ids already defined by this document; a second definition inside
        // the same document through a different envelope is a config bug and
        // is skipped rather than silently resolved.
        let mut local_ids: HashSet<String> = HashSet::new();

        if let Some(servers) = object.get("mcpServers").and_then(|v| v.as_object()) {
            for (id, entry) in servers {
                self.insert_server(id, entry.clone(), &mut local_ids, path);
            }
        }

        if let Some(packages) = object.get("packages").and_then(|v| v.as_array()) {
            for entry in packages {
                let id = entry.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                if id.is_empty() {
                    self.skipped.push(SkippedPackage {
                        id: String::new(),
                        reason: "id must be a non-empty string of letters, digits, '-', '_' or '.', got \"\""
                            .to_string(),
                    });
                    continue;
                }
                if local_ids.contains(&id) {
                    self.skipped.push(SkippedPackage {
                        reason: format!("duplicate id {:?}", id),
                        id,
                    });
                    continue;
                }
                self.insert_server(&id, entry.clone(), &mut local_ids, path);
            }
        }

        // Legacy flat form: unrecognized top-level keys whose value looks
        // like a server entry.
        for (key, value) in object {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let Some(entry) = value.as_object() else { continue };
            if !entry.contains_key("url") && !entry.contains_key("command") {
                continue;
            }
            if local_ids.contains(key) {
                self.skipped.push(SkippedPackage {
                    id: key.clone(),
                    reason: format!("duplicate id {:?}", key),
                });
                continue;
            }
            self.insert_server(key, value.clone(), &mut local_ids, path);
        }

        if let Some(security) = object.get("security") {
            match serde_json::from_value::<SecurityConfig>(security.clone()) {
                Ok(parsed) => self.security.merge_from(parsed),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring malformed security section"),
            }
        }

        if let Some(disabled) = object.get("userDisabledToolsByServer").and_then(|v| v.as_object()) {
            for (server, tools) in disabled {
                let set = self.user_disabled.entry(server.clone()).or_default();
                if let Some(tools) = tools.as_array() {
                    set.extend(tools.iter().filter_map(|t| t.as_str().map(str::to_owned)));
                }
            }
        }

        if let Some(disabled) = object.get("disabledServers").and_then(|v| v.as_array()) {
            self.disabled_servers
                .extend(disabled.iter().filter_map(|s| s.as_str().map(str::to_owned)));
        }
    }

    fn insert_server(
        &mut self,
        id: &str,
        entry: serde_json::Value,
        local_ids: &mut HashSet<String>,
        path: &Path,
    ) {
        if self.raw_servers.contains_key(id) {
            tracing::warn!(
                package = id,
                path = %path.display(),
                "later definition overrides earlier one"
            );
        }
        // `insert` on an existing key replaces the value but keeps the
        // original position, so iteration order stays stable across overrides.
        self.raw_servers.insert(id.to_string(), entry);
        local_ids.insert(id.to_string());
    }

    fn finish(mut self) -> LoadedConfig {
        for disabled in &self.disabled_servers {
            // shift_remove keeps the remaining entries in merged order.
            if self.raw_servers.shift_remove(disabled).is_some() {
                tracing::info!(package = %disabled, "server disabled by user config");
            }
        }

        let mut packages = Vec::new();
        for (id, entry) in &self.raw_servers {
            match normalize_entry(id, entry) {
                Ok(normalized) => packages.push(normalized.descriptor),
                Err(reason) => self.skipped.push(SkippedPackage {
                    id: id.clone(),
                    reason,
                }),
            }
        }

        LoadedConfig {
            packages,
            raw_servers: self.raw_servers,
            security: self.security,
            user_disabled: self.user_disabled,
            disabled_servers: self.disabled_servers,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_single_document_load() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{"mcpServers": {"fs": {"command": "fs-server"}, "web": {"url": "https://example.com/mcp"}}}"#,
        );

        let config = ConfigLoader::new().load(&[path]).unwrap();
        assert_eq!(config.packages.len(), 2);
        assert_eq!(config.packages[0].id, "fs");
        assert_eq!(config.packages[1].id, "web");
        assert!(config.skipped.is_empty());
    }

    #[test]
    fn test_invalid_entries_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{"mcpServers": {"x": {"type": "http", "url": "not a url"}, "ok": {"command": "echo"}}}"#,
        );

        let config = ConfigLoader::new().load(&[path]).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].id, "ok");
        assert_eq!(config.skipped.len(), 1);
        assert_eq!(config.skipped[0].id, "x");
        assert_eq!(
            config.skipped[0].reason,
            "base_url must be a valid URL, got \"not a url\""
        );
    }

    #[test]
    fn test_later_document_overrides_earlier() {
        let dir = TempDir::new().unwrap();
        let first = write_config(
            &dir,
            "first.json",
            r#"{"mcpServers": {"fs": {"command": "echo"}}}"#,
        );
        let second = write_config(
            &dir,
            "second.json",
            r#"{"mcpServers": {"fs": {"command": "cat"}}}"#,
        );

        let config = ConfigLoader::new().load(&[first, second]).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].command.as_deref(), Some("cat"));
        assert!(config.skipped.is_empty());
    }

    #[test]
    fn test_config_paths_are_followed() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "extra.json",
            r#"{"mcpServers": {"extra": {"command": "extra-server"}}}"#,
        );
        let root = write_config(
            &dir,
            "root.json",
            r#"{"configPaths": ["extra.json"], "mcpServers": {"fs": {"command": "echo"}}}"#,
        );

        let config = ConfigLoader::new().load(&[root]).unwrap();
        let ids: Vec<&str> = config.packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["fs", "extra"]);
    }

    #[test]
    fn test_circular_reference_is_fatal() {
        let dir = TempDir::new().unwrap();
        let a_path = dir.path().join("a.json");
        write_config(&dir, "b.json", r#"{"configPaths": ["a.json"]}"#);
        write_config(&dir, "a.json", r#"{"configPaths": ["b.json"]}"#);

        let err = ConfigLoader::new().load(&[a_path.clone()]).unwrap_err();
        match err {
            ConfigError::CircularReference { path } => {
                assert_eq!(path, a_path.canonicalize().unwrap());
            }
            other => panic!("expected circular reference error, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_forms_are_recognized() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "legacy.json",
            r#"{
                "packages": [{"id": "one", "command": "one-server"}],
                "two": {"url": "https://two.example.com/mcp"}
            }"#,
        );

        let config = ConfigLoader::new().load(&[path]).unwrap();
        let ids: Vec<&str> = config.packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two"]);
    }

    #[test]
    fn test_duplicate_id_across_envelopes_in_one_document() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dup.json",
            r#"{
                "mcpServers": {"fs": {"command": "echo"}},
                "packages": [{"id": "fs", "command": "cat"}]
            }"#,
        );

        let config = ConfigLoader::new().load(&[path]).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].command.as_deref(), Some("echo"));
        assert_eq!(config.skipped.len(), 1);
        assert_eq!(config.skipped[0].reason, "duplicate id \"fs\"");
    }

    #[test]
    fn test_security_sections_merge() {
        let dir = TempDir::new().unwrap();
        let first = write_config(
            &dir,
            "first.json",
            r#"{"security": {"blockedTools": ["rm"], "logBlockedAttempts": true}}"#,
        );
        let second = write_config(
            &dir,
            "second.json",
            r#"{"security": {"blockedTools": ["dd"], "logBlockedAttempts": false}}"#,
        );

        let config = ConfigLoader::new().load(&[first, second]).unwrap();
        assert_eq!(config.security.blocked_tools, vec!["rm", "dd"]);
        assert_eq!(config.security.log_blocked_attempts, Some(false));
    }

    #[test]
    fn test_disabled_servers_filter() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{
                "mcpServers": {"fs": {"command": "echo"}, "web": {"url": "https://example.com/mcp"}},
                "disabledServers": ["web"]
            }"#,
        );

        let config = ConfigLoader::new().load(&[path]).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].id, "fs");
        // Disabled servers are filtered, not skipped.
        assert!(config.skipped.is_empty());
    }

    #[test]
    fn test_user_disabled_tools_union() {
        let dir = TempDir::new().unwrap();
        let first = write_config(
            &dir,
            "first.json",
            r#"{"userDisabledToolsByServer": {"fs": ["write_file"]}}"#,
        );
        let second = write_config(
            &dir,
            "second.json",
            r#"{"userDisabledToolsByServer": {"fs": ["delete_file"]}}"#,
        );

        let config = ConfigLoader::new().load(&[first, second]).unwrap();
        let fs = config.user_disabled.get("fs").unwrap();
        assert!(fs.contains("write_file"));
        assert!(fs.contains("delete_file"));
    }
}

//! On-disk OAuth credential store
//!
//! Two JSON documents per package live under
//! `$HOME/.super-mcp/oauth-tokens`: `<id>_client` holds the client
//! registration plus the transient flow state (PKCE verifier, CSRF state,
//! saved callback port); `<id>_tokens` holds the RFC 6749 token fields.
//! Writes are best-effort: a failed save logs and the operation continues.
//! Token values never appear in logs; only presence, client id and paths do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Client registration and transient flow state for one package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// PKCE code verifier for the flow currently in progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,

    /// CSRF state nonce for the flow currently in progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Loopback port the registered redirect URI points at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_port: Option<u16>,
}

/// Token document for one package, mirroring RFC 6749 fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Whether the access token is expired (with a 30 s skew margin)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + chrono::Duration::seconds(30) >= at,
            None => false,
        }
    }
}

/// Selective deletion scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Remove everything for the package
    All,
    /// Remove the client registration (and its transient state)
    Client,
    /// Remove the token document
    Tokens,
    /// Remove only the PKCE verifier and state nonce
    Verifier,
}

/// File-backed credential store keyed by package id
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Store rooted at `$HOME/.super-mcp/oauth-tokens`
    pub fn new() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".super-mcp")
            .join("oauth-tokens");
        Self { root }
    }

    /// Store rooted at an explicit directory (tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn client_path(&self, package_id: &str) -> PathBuf {
        self.root.join(format!("{}_client", package_id))
    }

    fn tokens_path(&self, package_id: &str) -> PathBuf {
        self.root.join(format!("{}_tokens", package_id))
    }

    pub fn load_client(&self, package_id: &str) -> Option<ClientRecord> {
        self.load_document(&self.client_path(package_id))
    }

    pub fn load_tokens(&self, package_id: &str) -> Option<TokenRecord> {
        self.load_document(&self.tokens_path(package_id))
    }

    /// Best-effort save of the client document
    pub fn save_client(&self, package_id: &str, record: &ClientRecord) {
        let path = self.client_path(package_id);
        self.save_document(&path, record);
        tracing::debug!(
            package = package_id,
            client_id = %record.client_id,
            path = %path.display(),
            has_verifier = record.pkce_verifier.is_some(),
            "saved OAuth client record"
        );
    }

    /// Best-effort save of the token document
    pub fn save_tokens(&self, package_id: &str, record: &TokenRecord) {
        let path = self.tokens_path(package_id);
        self.save_document(&path, record);
        tracing::debug!(
            package = package_id,
            path = %path.display(),
            has_refresh_token = record.refresh_token.is_some(),
            expires_at = ?record.expires_at,
            "saved OAuth tokens"
        );
    }

    /// Selectively delete credential material
    pub fn invalidate(&self, package_id: &str, scope: InvalidationScope) {
        match scope {
            InvalidationScope::All => {
                remove_quiet(&self.client_path(package_id));
                remove_quiet(&self.tokens_path(package_id));
            }
            InvalidationScope::Client => remove_quiet(&self.client_path(package_id)),
            InvalidationScope::Tokens => remove_quiet(&self.tokens_path(package_id)),
            InvalidationScope::Verifier => {
                if let Some(mut record) = self.load_client(package_id) {
                    record.pkce_verifier = None;
                    record.state = None;
                    self.save_client(package_id, &record);
                }
            }
        }
        tracing::debug!(package = package_id, ?scope, "invalidated OAuth credentials");
    }

    /// When the saved callback port differs from the one in use, the
    /// registered redirect URI no longer matches reality; discard the
    /// registration and tokens so the next flow re-registers at the right
    /// redirect URI. Returns whether an invalidation happened.
    pub fn check_and_invalidate_on_port_mismatch(&self, package_id: &str, current_port: u16) -> bool {
        let Some(record) = self.load_client(package_id) else {
            return false;
        };
        match record.callback_port {
            Some(saved) if saved != current_port => {
                tracing::info!(
                    package = package_id,
                    saved_port = saved,
                    current_port,
                    "callback port changed; invalidating client registration and tokens"
                );
                self.invalidate(package_id, InvalidationScope::Client);
                self.invalidate(package_id, InvalidationScope::Tokens);
                true
            }
            _ => false,
        }
    }

    /// Saved callback port, if any
    pub fn saved_callback_port(&self, package_id: &str) -> Option<u16> {
        self.load_client(package_id).and_then(|r| r.callback_port)
    }

    fn load_document<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Option<T> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read credential file");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse credential file");
                None
            }
        }
    }

    fn save_document<T: Serialize>(&self, path: &Path, record: &T) {
        if let Err(e) = self.try_save(path, record) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save credential file");
        }
    }

    fn try_save<T: Serialize>(&self, path: &Path, record: &T) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        restrict_permissions(&self.root, 0o700)?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        restrict_permissions(path, 0o600)?;
        Ok(())
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove credential file");
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

//! OAuth 2.0 providers
//!
//! One concrete provider backs both behavioral modes. Interactive mode may
//! start a browser authorization flow; refresh-only mode delegates every
//! read/save to the same credential store but converts any would-be browser
//! redirect into `AuthenticationRequired`, so passive operations (discovery,
//! health checks) can renew tokens silently without pop-ups.
//!
//! Endpoints come from RFC 8414 metadata discovery at the upstream origin,
//! with conventional fallbacks when the server publishes none. Clients are
//! registered dynamically (RFC 7591) unless the descriptor carries a static
//! client id. Authorization uses PKCE (S256) and a 128-bit+ CSRF state.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::store::{ClientRecord, CredentialStore, InvalidationScope, TokenRecord};

/// Behavioral mode of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// May start a browser authorization flow
    Interactive,
    /// Refresh tokens silently; browser redirects become failures
    RefreshOnly,
}

/// Authorization server endpoints
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthServerMetadata {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
}

/// A prepared browser authorization request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// URL the user's browser must visit
    pub authorize_url: Url,
    /// CSRF state nonce the callback must echo
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct WireTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: Vec<String>,
    grant_types: Vec<&'a str>,
    response_types: Vec<&'a str>,
    token_endpoint_auth_method: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

/// Generate a PKCE code verifier (43–128 chars of unreserved alphabet)
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 48];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the S256 code challenge from a verifier
pub fn challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a CSRF state nonce with at least 128 bits of entropy
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn redirect_uri_for(port: u16) -> String {
    format!("http://localhost:{}/oauth/callback", port)
}

/// OAuth provider for one package
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    package_id: String,
    base_url: Url,
    mode: AuthMode,
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    static_client: Option<(String, Option<String>)>,
}

impl OAuthProvider {
    pub fn new(
        package_id: impl Into<String>,
        base_url: Url,
        mode: AuthMode,
        store: Arc<CredentialStore>,
        static_client: Option<(String, Option<String>)>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            base_url,
            mode,
            store,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            static_client,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// The same provider with the other dispatch mode
    pub fn with_mode(&self, mode: AuthMode) -> Self {
        let mut clone = self.clone();
        clone.mode = mode;
        clone
    }

    /// Whether any tokens are stored for this package
    pub fn has_tokens(&self) -> bool {
        self.store.load_tokens(&self.package_id).is_some()
    }

    /// Return a usable access token, refreshing silently when possible.
    ///
    /// When no token can be produced without a browser, fails with
    /// `AuthenticationRequired` in both modes; only an explicit
    /// `authenticate` operation starts the interactive flow.
    pub async fn ensure_token(&self) -> AuthResult<String> {
        let tokens = self.store.load_tokens(&self.package_id);
        match tokens {
            Some(record) if !record.is_expired() => Ok(record.access_token),
            Some(record) => match record.refresh_token {
                Some(refresh_token) => {
                    let refreshed = self.refresh(&refresh_token).await?;
                    Ok(refreshed.access_token)
                }
                None => Err(AuthError::AuthenticationRequired {
                    package: self.package_id.clone(),
                }),
            },
            None => Err(AuthError::AuthenticationRequired {
                package: self.package_id.clone(),
            }),
        }
    }

    /// Prepare a browser authorization request.
    ///
    /// Generates fresh PKCE material and a state nonce, persists them with
    /// the callback port, and builds the authorize URL. Refresh-only
    /// providers fail here with "authentication required".
    pub async fn begin_authorization(&self, callback_port: u16) -> AuthResult<AuthorizationRequest> {
        if self.mode == AuthMode::RefreshOnly {
            return Err(AuthError::AuthenticationRequired {
                package: self.package_id.clone(),
            });
        }

        let metadata = self.discover().await?;
        let redirect_uri = redirect_uri_for(callback_port);
        let mut client = self.ensure_client(&metadata, &redirect_uri).await?;

        let verifier = generate_verifier();
        let state = generate_state();
        client.pkce_verifier = Some(verifier.clone());
        client.state = Some(state.clone());
        client.callback_port = Some(callback_port);
        self.store.save_client(&self.package_id, &client);

        let mut authorize_url = Url::parse(&metadata.authorization_endpoint)?;
        authorize_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &client.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("code_challenge", &challenge_s256(&verifier))
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &state);

        Ok(AuthorizationRequest { authorize_url, state })
    }

    /// Exchange an authorization code using the stored PKCE verifier, then
    /// persist the tokens and clear the transient flow state.
    pub async fn exchange_code(&self, code: &str) -> AuthResult<TokenRecord> {
        let metadata = self.discover().await?;
        let client = self
            .store
            .load_client(&self.package_id)
            .ok_or_else(|| AuthError::MissingTransient {
                package: self.package_id.clone(),
                what: "client registration",
            })?;
        let verifier = client
            .pkce_verifier
            .clone()
            .ok_or_else(|| AuthError::MissingTransient {
                package: self.package_id.clone(),
                what: "PKCE verifier",
            })?;
        let port = client.callback_port.unwrap_or(crate::ports::DEFAULT_CALLBACK_PORT);

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri_for(port)),
            ("client_id", client.client_id.clone()),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = &client.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let tokens = self.token_request(&metadata.token_endpoint, &form).await?;
        self.store.save_tokens(&self.package_id, &tokens);
        self.store.invalidate(&self.package_id, InvalidationScope::Verifier);
        Ok(tokens)
    }

    /// Refresh-token grant; on `invalid_grant` the stored tokens are
    /// discarded so the next flow starts clean.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenRecord> {
        let metadata = self.discover().await?;
        let client = self.store.load_client(&self.package_id);
        let client_id = client
            .as_ref()
            .map(|c| c.client_id.clone())
            .or_else(|| self.static_client.as_ref().map(|(id, _)| id.clone()))
            .unwrap_or_default();

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", client_id),
        ];
        if let Some(secret) = client.as_ref().and_then(|c| c.client_secret.clone()) {
            form.push(("client_secret", secret));
        }

        match self.token_request(&metadata.token_endpoint, &form).await {
            Ok(mut tokens) => {
                // Providers may rotate or omit the refresh token; keep the
                // old one when none is returned.
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token.to_string());
                }
                self.store.save_tokens(&self.package_id, &tokens);
                tracing::info!(package = %self.package_id, "refreshed OAuth access token");
                Ok(tokens)
            }
            Err(AuthError::Exchange { message }) if message.contains("invalid_grant") => {
                self.store.invalidate(&self.package_id, InvalidationScope::Tokens);
                Err(AuthError::AuthenticationRequired {
                    package: self.package_id.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn token_request(&self, endpoint: &str, form: &[(&str, String)]) -> AuthResult<TokenRecord> {
        let response = self.http.post(endpoint).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                message: format!("{} from token endpoint: {}", status, body),
            });
        }

        let wire: WireTokenResponse = response.json().await?;
        Ok(TokenRecord {
            access_token: wire.access_token,
            refresh_token: wire.refresh_token,
            expires_at: wire
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64)),
        })
    }

    /// RFC 8414 metadata discovery with conventional fallbacks
    pub async fn discover(&self) -> AuthResult<AuthServerMetadata> {
        let origin = self.origin()?;
        let well_known = format!("{}/.well-known/oauth-authorization-server", origin);

        match self.http.get(&well_known).send().await {
            Ok(response) if response.status().is_success() => {
                response.json().await.map_err(|e| AuthError::Discovery {
                    url: well_known,
                    message: e.to_string(),
                })
            }
            Ok(_) | Err(_) => Ok(AuthServerMetadata {
                authorization_endpoint: format!("{}/authorize", origin),
                token_endpoint: format!("{}/token", origin),
                registration_endpoint: Some(format!("{}/register", origin)),
            }),
        }
    }

    /// Static client, stored registration, or fresh dynamic registration
    async fn ensure_client(
        &self,
        metadata: &AuthServerMetadata,
        redirect_uri: &str,
    ) -> AuthResult<ClientRecord> {
        if let Some((client_id, client_secret)) = &self.static_client {
            return Ok(ClientRecord {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                ..ClientRecord::default()
            });
        }

        if let Some(existing) = self.store.load_client(&self.package_id) {
            if !existing.client_id.is_empty() {
                return Ok(existing);
            }
        }

        let endpoint = metadata
            .registration_endpoint
            .as_ref()
            .ok_or_else(|| AuthError::Registration {
                message: "server publishes no registration endpoint and no static client id is configured"
                    .to_string(),
            })?;

        let request = RegistrationRequest {
            client_name: "super-mcp",
            redirect_uris: vec![redirect_uri.to_string()],
            grant_types: vec!["authorization_code", "refresh_token"],
            response_types: vec!["code"],
            token_endpoint_auth_method: "none",
        };

        let response = self.http.post(endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Registration {
                message: format!("{} from registration endpoint: {}", status, body),
            });
        }
        let registered: RegistrationResponse =
            response.json().await.map_err(|e| AuthError::Registration {
                message: format!("malformed registration response: {}", e),
            })?;

        tracing::info!(
            package = %self.package_id,
            client_id = %registered.client_id,
            "registered OAuth client dynamically"
        );

        Ok(ClientRecord {
            client_id: registered.client_id,
            client_secret: registered.client_secret,
            ..ClientRecord::default()
        })
    }

    fn origin(&self) -> AuthResult<String> {
        let mut origin = self.base_url.clone();
        origin.set_path("");
        origin.set_query(None);
        origin.set_fragment(None);
        Ok(origin.as_str().trim_end_matches('/').to_string())
    }
}

//! OAuth 2.0 support for super-mcp upstream packages
//!
//! Covers the whole credential lifecycle: the on-disk store, metadata
//! discovery and dynamic client registration, PKCE authorization with a
//! loopback callback server, silent refresh, and selective invalidation.
//! The interactive and refresh-only providers are one concrete provider
//! behind two dispatch modes sharing a single store.

pub mod browser;
pub mod callback;
pub mod error;
pub mod ports;
pub mod provider;
pub mod store;

pub use browser::{default_launcher, open_browser, BrowserLauncher};
pub use callback::{CallbackServer, DEFAULT_CALLBACK_TIMEOUT};
pub use error::{AuthError, AuthResult};
pub use ports::{
    find_free_port, port_is_free, CALLBACK_HOST, DEFAULT_CALLBACK_PORT, DEFAULT_PORT_ATTEMPTS,
};
pub use provider::{
    challenge_s256, generate_state, generate_verifier, AuthMode, AuthServerMetadata,
    AuthorizationRequest, OAuthProvider,
};
pub use store::{ClientRecord, CredentialStore, InvalidationScope, TokenRecord};

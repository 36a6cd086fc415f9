//! Shared gateway state.

use crate::auth::AuthContext;
use crate::mcp::McpDispatcher;
use crate::oauth::{
    GoogleEndpoints, GoogleOAuthClient, PendingAuthorization, RegisteredClient, TokenSet,
    TtlStore, CODE_TTL_SECS, REGISTRATION_TTL_SECS, STATE_TTL_SECS,
};
use crate::server::sessions::SessionRegistry;
use crate::server::GatewayConfig;

use drivemcp_core::GoogleKeys;

/// Everything the handlers share. Wrapped in an `Arc` by the server;
/// all interior containers are concurrent, so no outer lock is needed.
#[derive(Debug)]
pub struct AppState {
    pub config: GatewayConfig,
    pub keys: GoogleKeys,
    pub endpoints: GoogleEndpoints,
    /// CSRF state -> what the client asked for, pending Google's callback.
    pub pending_authorizations: TtlStore<PendingAuthorization>,
    /// One-time proxy codes -> the tokens they redeem into.
    pub authorization_codes: TtlStore<TokenSet>,
    /// Dynamically registered client metadata.
    pub registered_clients: TtlStore<RegisteredClient>,
    pub sessions: SessionRegistry,
    pub dispatcher: McpDispatcher,
    /// Server-side identity used when the auth policy allows requests
    /// without their own token.
    pub preauth: Option<AuthContext>,
}

impl AppState {
    pub fn new(config: GatewayConfig, keys: GoogleKeys) -> Self {
        Self {
            config,
            keys,
            endpoints: GoogleEndpoints::default(),
            pending_authorizations: TtlStore::new(STATE_TTL_SECS),
            authorization_codes: TtlStore::new(CODE_TTL_SECS),
            registered_clients: TtlStore::new(REGISTRATION_TTL_SECS),
            sessions: SessionRegistry::default(),
            dispatcher: McpDispatcher::default(),
            preauth: None,
        }
    }

    /// Point the OAuth leg at different endpoints (used by tests).
    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Point the Drive leg at a different API base (used by tests).
    pub fn with_drive_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.dispatcher = McpDispatcher::new(base_url);
        self
    }

    pub fn with_preauth(mut self, preauth: Option<AuthContext>) -> Self {
        self.preauth = preauth;
        self
    }

    /// Shrink the state and proxy-code lifetimes (used by expiry tests).
    pub fn with_proxy_ttls(mut self, state_ttl_secs: i64, code_ttl_secs: i64) -> Self {
        self.pending_authorizations = TtlStore::new(state_ttl_secs);
        self.authorization_codes = TtlStore::new(code_ttl_secs);
        self
    }

    /// OAuth client for the Google leg. Constructed fresh per operation;
    /// it holds no connection state worth caching.
    pub fn google_client(&self) -> GoogleOAuthClient {
        GoogleOAuthClient::new(&self.keys, self.endpoints.clone())
    }

    /// The redirect URI registered with Google for this deployment.
    pub fn callback_url(&self, base_url: &str) -> String {
        format!("{}/oauth/callback", base_url)
    }
}

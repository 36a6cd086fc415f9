//! Gateway HTTP server.
//!
//! Axum server exposing the OAuth proxy, discovery metadata, and both
//! MCP HTTP transports behind the bearer-validation middleware.

mod handlers;
mod sessions;
mod state;

pub use sessions::{Session, SessionError, SessionRegistry, TransportFamily};
pub use state::AppState;

use axum::{
    http::HeaderMap,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{self, AuthPolicy};

pub const ENV_HOST: &str = "DRIVEMCP_HOST";
pub const ENV_PORT: &str = "DRIVEMCP_PORT";
pub const ENV_BASE_URL: &str = "DRIVEMCP_BASE_URL";
pub const ENV_AUTH_POLICY: &str = "DRIVEMCP_AUTH_POLICY";
pub const ENV_ENABLE_CORS: &str = "DRIVEMCP_ENABLE_CORS";
pub const ENV_CDN_SUFFIX: &str = "DRIVEMCP_CDN_SUFFIX";

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Externally reachable base URL, when the bind address is not it.
    pub base_url: Option<String>,
    /// Enable CORS for browser-based clients.
    pub enable_cors: bool,
    /// How strictly bearer tokens are enforced.
    pub auth_policy: AuthPolicy,
    /// Hostname suffix that marks CDN-fronted traffic, which is always
    /// HTTPS regardless of what the forwarded headers claim.
    pub cdn_suffix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: None,
            enable_cors: true,
            auth_policy: AuthPolicy::default(),
            cdn_suffix: ".cloudfront.net".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `DRIVEMCP_*` environment variables,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var(ENV_HOST) {
            if !host.is_empty() {
                config.host = host;
            }
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!("[Gateway] Ignoring unparseable {}: {}", ENV_PORT, port),
            }
        }
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            if !base_url.is_empty() {
                config.base_url = Some(base_url.trim_end_matches('/').to_string());
            }
        }
        if let Ok(policy) = std::env::var(ENV_AUTH_POLICY) {
            match AuthPolicy::parse(&policy) {
                Some(policy) => config.auth_policy = policy,
                None => warn!(
                    "[Gateway] Ignoring unknown {}: {} (expected required/optional/disabled)",
                    ENV_AUTH_POLICY, policy
                ),
            }
        }
        if let Ok(enable_cors) = std::env::var(ENV_ENABLE_CORS) {
            config.enable_cors = enable_cors != "false" && enable_cors != "0";
        }
        if let Ok(cdn_suffix) = std::env::var(ENV_CDN_SUFFIX) {
            if !cdn_suffix.is_empty() {
                config.cdn_suffix = cdn_suffix;
            }
        }

        config
    }

    /// The bind address, left as a string for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL when no request headers are available to improve on it.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(base_url) => base_url.clone(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    /// Externally visible base URL for a given request.
    ///
    /// Behind a reverse proxy or CDN the bind address says nothing about
    /// how clients reach this server, so the forwarded headers win:
    /// `X-Forwarded-Host`/`Host` pick the host, a CDN hostname forces
    /// HTTPS, and `X-Forwarded-Proto` decides the scheme otherwise.
    pub fn public_base_url(&self, headers: &HeaderMap) -> String {
        let Some(host) =
            header_value(headers, "x-forwarded-host").or_else(|| header_value(headers, "host"))
        else {
            return self.base_url();
        };

        if host.ends_with(&self.cdn_suffix) {
            return format!("https://{}", host);
        }

        let scheme =
            header_value(headers, "x-forwarded-proto").unwrap_or_else(|| self.default_scheme());
        format!("{}://{}", scheme, host)
    }

    fn default_scheme(&self) -> &'static str {
        match self.base_url.as_deref() {
            Some(base_url) if base_url.starts_with("https") => "https",
            _ => "http",
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// The gateway server. Owns the shared state and a cancellation token
/// that triggers graceful shutdown.
pub struct GatewayServer {
    state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/.well-known/oauth-authorization-server",
                get(handlers::oauth_metadata),
            )
            .route(
                "/.well-known/oauth-protected-resource",
                get(handlers::resource_metadata),
            )
            .route("/oauth/authorize", get(handlers::oauth_authorize))
            .route("/oauth/callback", get(handlers::oauth_callback))
            .route("/oauth/token", post(handlers::oauth_token))
            .route("/oauth/register", post(handlers::oauth_register))
            .route("/sse", get(handlers::sse_connect))
            .route("/message", post(handlers::sse_message))
            .route(
                "/mcp",
                post(handlers::mcp_post)
                    .get(handlers::mcp_get)
                    .delete(handlers::mcp_delete),
            )
            .with_state(self.state.clone())
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::bearer_auth_middleware,
            ))
            .layer(TraceLayer::new_for_http());

        if self.state.config.enable_cors {
            // expose_headers makes Mcp-Session-Id readable from browsers.
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Bind and serve until the shutdown token fires.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.state.config.addr();
        info!(
            "[Gateway] Starting on {} (auth policy: {:?})",
            addr, self.state.config.auth_policy
        );
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener (tests bind to port 0).
    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        info!(
            "[Gateway] CORS: {}",
            if self.state.config.enable_cors {
                "enabled"
            } else {
                "disabled"
            }
        );

        let router = self.build_router();
        let state = self.state.clone();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("[Gateway] Shutdown requested, closing sessions");
                // Dropping the stored push senders ends every open
                // stream, letting in-flight connections drain.
                state.sessions.close_all();
            })
            .await?;

        info!("[Gateway] Server stopped");
        Ok(())
    }
}

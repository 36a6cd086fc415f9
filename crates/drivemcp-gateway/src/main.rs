//! Gateway binary.
//!
//! Runs the HTTP server by default; `drivemcp-gateway stdio` runs the
//! single-user stdio transport instead.

use anyhow::Context;
use drivemcp_core::credentials::{FileKeyProvider, GoogleKeys, KeyProvider, ENV_CREDENTIALS_FILE};
use drivemcp_core::scopes::REQUIRED_SCOPES;
use drivemcp_gateway::mcp::stdio::StdioTransport;
use drivemcp_gateway::oauth::GoogleOAuthClient;
use drivemcp_gateway::{
    AppState, AuthContext, AuthPolicy, GatewayConfig, GatewayServer, GoogleEndpoints,
    McpDispatcher,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file is optional.
    let _ = dotenvy::dotenv();

    let stdio_mode = std::env::args().skip(1).any(|arg| arg == "stdio");
    init_tracing(stdio_mode);

    if stdio_mode {
        run_stdio().await
    } else {
        run_http().await
    }
}

fn init_tracing(stderr_only: bool) {
    // RUST_LOG takes precedence, with debug defaults for our crates.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("drivemcp_gateway=debug".parse().unwrap())
            .add_directive("drivemcp_core=debug".parse().unwrap())
    });

    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact();

    if stderr_only {
        // Stdout carries the protocol stream in stdio mode.
        fmt.with_writer(std::io::stderr).with_ansi(false).init();
    } else {
        fmt.init();
    }
}

async fn run_http() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();
    let provider = FileKeyProvider::from_env();

    let keys = match provider.google_keys().await {
        Ok(keys) => keys,
        Err(err) if config.auth_policy == AuthPolicy::Disabled => {
            warn!(
                "[Gateway] No Google client keys ({}); OAuth endpoints will reject requests",
                err
            );
            GoogleKeys::default()
        }
        Err(err) => return Err(err).context("loading Google OAuth client keys"),
    };

    let endpoints = GoogleEndpoints::default();
    let preauth = preauth_context(&provider, &keys, &endpoints).await?;
    if config.auth_policy != AuthPolicy::Required && preauth.is_none() {
        warn!(
            "[Gateway] Auth policy {:?} without a stored credential: unauthenticated \
             requests will fail at the Drive API",
            config.auth_policy
        );
    }

    let state = AppState::new(config, keys).with_preauth(preauth);
    let server = GatewayServer::new(state);

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[Gateway] Ctrl-C received");
            shutdown.cancel();
        }
    });

    server.run().await
}

async fn run_stdio() -> anyhow::Result<()> {
    let provider = FileKeyProvider::from_env();
    // Keys are only needed for the startup refresh; a stored token that
    // is still valid works without them.
    let keys = provider.google_keys().await.unwrap_or_default();

    let auth = preauth_context(&provider, &keys, &GoogleEndpoints::default())
        .await?
        .with_context(|| {
            format!(
                "stdio mode requires a stored credential (set {})",
                ENV_CREDENTIALS_FILE
            )
        })?;

    Ok(StdioTransport::new(McpDispatcher::default(), auth).run().await?)
}

/// Identity used for requests that arrive without their own bearer token.
///
/// Loads the stored credential and refreshes it once at startup when a
/// refresh token and client keys are available, so a long-idle file does
/// not start the server with an already-expired access token.
async fn preauth_context(
    provider: &FileKeyProvider,
    keys: &GoogleKeys,
    endpoints: &GoogleEndpoints,
) -> anyhow::Result<Option<AuthContext>> {
    let Some(credential) = provider.stored_credential().await? else {
        return Ok(None);
    };

    if let Some(refresh_token) = credential
        .refresh_token
        .as_deref()
        .filter(|_| !keys.client_id.is_empty())
    {
        let client = GoogleOAuthClient::new(keys, endpoints.clone());
        match client.refresh_token(refresh_token).await {
            Ok(tokens) => {
                info!("[Gateway] Refreshed stored credential at startup");
                let scopes = tokens
                    .scope
                    .as_deref()
                    .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_else(default_scopes);
                return Ok(Some(AuthContext {
                    access_token: tokens.access_token,
                    scopes,
                    email: None,
                }));
            }
            Err(err) => {
                warn!(
                    "[Gateway] Startup token refresh failed ({}); using stored token as-is",
                    err
                );
            }
        }
    }

    Ok(Some(AuthContext {
        access_token: credential.access_token,
        scopes: default_scopes(),
        email: None,
    }))
}

fn default_scopes() -> Vec<String> {
    REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect()
}

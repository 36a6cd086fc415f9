//! HTTP handlers for the gateway server.
//!
//! Three groups share this file:
//! - the OAuth proxy (authorize, callback, token, register, discovery),
//! - the legacy SSE transport (`/sse` + `/message`),
//! - the streamable HTTP transport (`/mcp`).
//!
//! OAuth-flow failures that happen mid-redirect render HTML, because the
//! user agent is a browser at that point; token and session failures
//! render JSON, because the caller is a programmatic MCP client.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use drivemcp_core::scopes::{scope_string, REQUIRED_SCOPES};

use crate::auth::AuthContext;
use crate::mcp::protocol::{self, error_codes};
use crate::oauth::{
    generate_proxy_code, generate_state, process_registration, ExchangeError,
    PendingAuthorization, RegisterRequest, RegisterResponse, TokenSet,
};
use crate::server::sessions::{SessionError, TransportFamily};
use crate::server::state::AppState;

/// Session id header used by the streamable HTTP transport.
const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Capacity of a session's push channel. Senders block (asynchronously)
/// when a client stops draining its stream.
const PUSH_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// OAuth discovery metadata
// ============================================================================

/// Authorization server metadata (RFC 8414).
///
/// `code_challenge_methods_supported` is omitted on purpose: the token
/// endpoint never verifies a PKCE challenge, and advertising S256 would
/// make compliant clients expect enforcement that does not exist.
#[derive(Serialize)]
pub struct OAuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

pub async fn oauth_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<OAuthServerMetadata> {
    info!("[Gateway] Authorization server metadata request");
    let base = state.config.public_base_url(&headers);
    Json(OAuthServerMetadata {
        issuer: base.clone(),
        authorization_endpoint: format!("{}/oauth/authorize", base),
        token_endpoint: format!("{}/oauth/token", base),
        registration_endpoint: format!("{}/oauth/register", base),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        token_endpoint_auth_methods_supported: vec!["none".to_string()],
        scopes_supported: REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect(),
    })
}

/// Protected resource metadata (RFC 9728). This gateway declares itself
/// the authorization server: clients must not be pointed at Google's
/// metadata, because the code and token contract here is proxy-specific.
#[derive(Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
}

pub async fn resource_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<ProtectedResourceMetadata> {
    info!("[Gateway] Protected resource metadata request");
    let base = state.config.public_base_url(&headers);
    Json(ProtectedResourceMetadata {
        resource: base.clone(),
        authorization_servers: vec![base],
        scopes_supported: REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect(),
        bearer_methods_supported: vec!["header".to_string()],
    })
}

// ============================================================================
// OAuth authorization flow
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    /// Logged only; registration is advisory and never enforced here.
    pub client_id: Option<String>,
}

/// GET /oauth/authorize - start the flow by bouncing through Google.
pub async fn oauth_authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let swept = state.pending_authorizations.sweep_expired();
    if swept > 0 {
        debug!("[OAuth] Swept {} expired pending authorization(s)", swept);
    }

    info!(
        "[OAuth] Authorization request: client_id={:?}, redirect_uri={:?}",
        params.client_id, params.redirect_uri
    );

    if let Some(response_type) = params.response_type.as_deref() {
        if response_type != "code" {
            warn!("[OAuth] Unsupported response_type: {}", response_type);
            let description = "Only the 'code' response type is supported";
            return match params.redirect_uri.as_deref() {
                Some(redirect_uri) => oauth_error_redirect(
                    redirect_uri,
                    "unsupported_response_type",
                    description,
                    params.state.as_deref(),
                ),
                None => failure_page(
                    StatusCode::BAD_REQUEST,
                    "unsupported_response_type",
                    description,
                ),
            };
        }
    }

    let base_url = state.config.public_base_url(&headers);
    let csrf_state = generate_state();
    state.pending_authorizations.put(
        csrf_state.clone(),
        PendingAuthorization {
            client_redirect_uri: params.redirect_uri.clone(),
            client_state: params.state.clone(),
        },
    );

    let consent_url = match state.google_client().consent_url(
        &state.callback_url(&base_url),
        &csrf_state,
        &REQUIRED_SCOPES,
    ) {
        Ok(url) => url,
        Err(err) => {
            error!("[OAuth] Could not build consent URL: {}", err);
            return failure_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Could not build the Google consent URL",
            );
        }
    };

    debug!("[OAuth] Redirecting to Google consent");
    Redirect::to(&consent_url).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /oauth/callback - Google sends the user agent back here.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let swept = state.authorization_codes.sweep_expired();
    if swept > 0 {
        debug!("[OAuth] Swept {} expired proxy code(s)", swept);
    }

    if let Some(error) = params.error.as_deref() {
        warn!(
            "[OAuth] Google returned an error: {} ({:?})",
            error, params.error_description
        );
        return failure_page(
            StatusCode::BAD_REQUEST,
            error,
            params
                .error_description
                .as_deref()
                .unwrap_or("Google reported an error during authorization"),
        );
    }

    // CSRF defense: the state must be one this server minted, still
    // fresh, and never seen before. Consumption happens before anything
    // else so a replayed callback fails even when the first one did.
    let Some(pending) = params
        .state
        .as_deref()
        .and_then(|s| state.pending_authorizations.take_once(s))
    else {
        warn!("[OAuth] Callback with unknown, expired, or replayed state");
        return failure_page(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "Authorization state is unknown, expired, or already used",
        );
    };

    let Some(code) = params.code.as_deref() else {
        warn!("[OAuth] Callback missing authorization code");
        return failure_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Google did not return an authorization code",
        );
    };

    let base_url = state.config.public_base_url(&headers);
    let tokens = match state
        .google_client()
        .exchange_code(code, &state.callback_url(&base_url))
        .await
    {
        Ok(tokens) => tokens,
        Err(err) => {
            error!("[OAuth] Code exchange failed: {}", err);
            return failure_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Could not exchange the authorization code with Google",
            );
        }
    };

    match pending.client_redirect_uri {
        // Proxy-mediated client flow: the client never sees Google's
        // code or tokens; it gets a code this server controls instead.
        Some(client_redirect_uri) => {
            let proxy_code = generate_proxy_code();
            state.authorization_codes.put(proxy_code.clone(), tokens);

            let mut url = client_redirect_uri;
            url.push_str(if url.contains('?') { "&" } else { "?" });
            url.push_str(&format!("code={}", proxy_code));
            if let Some(client_state) = pending.client_state.as_deref() {
                url.push_str(&format!("&state={}", urlencoding::encode(client_state)));
            }

            info!("[OAuth] Minted proxy code, redirecting back to client");
            Redirect::to(&url).into_response()
        }
        // Manual flow: no client to redirect to, show the token.
        None => {
            info!("[OAuth] Manual flow complete, rendering token page");
            token_page(&tokens)
        }
    }
}

fn oauth_error_redirect(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let mut url = redirect_uri.to_string();
    url.push_str(if url.contains('?') { "&" } else { "?" });
    url.push_str(&format!(
        "error={}&error_description={}",
        error,
        urlencoding::encode(description)
    ));
    if let Some(s) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(s)));
    }
    Redirect::to(&url).into_response()
}

// ============================================================================
// OAuth token endpoint
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Logged only; this server never authenticates clients.
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponseBody {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl TokenResponseBody {
    fn from_token_set(tokens: TokenSet, include_refresh: bool) -> Self {
        let expires_in = tokens.expires_in_secs();
        Self {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: if include_refresh {
                tokens.refresh_token
            } else {
                None
            },
            scope: tokens.scope.unwrap_or_else(scope_string),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Token requests arrive form-encoded or as JSON, and some clients send
/// one with the other's content type. The declared type only decides
/// which parse runs first; urlencoded parsing accepts almost any bytes,
/// so the parse that actually produced a `grant_type` wins.
fn parse_token_request(content_type: Option<&str>, body: &[u8]) -> Option<TokenRequest> {
    let declared_json = content_type.map(|ct| ct.contains("json")).unwrap_or(false);

    let json = serde_json::from_slice::<TokenRequest>(body).ok();
    let form = serde_urlencoded::from_bytes::<TokenRequest>(body).ok();

    let (first, second) = if declared_json { (json, form) } else { (form, json) };
    match (first, second) {
        (Some(parsed), _) if parsed.grant_type.is_some() => Some(parsed),
        (_, Some(parsed)) if parsed.grant_type.is_some() => Some(parsed),
        (Some(parsed), _) => Some(parsed),
        (_, Some(parsed)) => Some(parsed),
        (None, None) => None,
    }
}

/// POST /oauth/token - redeem a proxy code or refresh an access token.
pub async fn oauth_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenResponseBody>, (StatusCode, Json<TokenErrorResponse>)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let Some(request) = parse_token_request(content_type, &body) else {
        warn!("[OAuth] Token request body is neither form-encoded nor JSON");
        return Err(token_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Request body must be form-encoded or JSON",
        ));
    };

    info!(
        "[OAuth] Token request: grant_type={:?}, client_id={:?}",
        request.grant_type, request.client_id
    );

    match request.grant_type.as_deref() {
        Some("authorization_code") => {
            let Some(code) = request.code.as_deref() else {
                warn!("[OAuth] Missing authorization code");
                return Err(token_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    "Missing authorization code",
                ));
            };

            // Single use: the code is deleted on lookup, so a replayed
            // exchange finds nothing.
            let Some(tokens) = state.authorization_codes.take_once(code) else {
                warn!("[OAuth] Unknown, expired, or replayed authorization code");
                return Err(token_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "Authorization code is invalid or expired",
                ));
            };

            info!("[OAuth] Proxy code redeemed");
            Ok(Json(TokenResponseBody::from_token_set(tokens, true)))
        }
        Some("refresh_token") => {
            let Some(refresh_token) = request.refresh_token.as_deref() else {
                warn!("[OAuth] Missing refresh token");
                return Err(token_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    "Missing refresh token",
                ));
            };

            match state.google_client().refresh_token(refresh_token).await {
                // Google does not re-issue refresh tokens on refresh,
                // and neither does this endpoint.
                Ok(tokens) => Ok(Json(TokenResponseBody::from_token_set(tokens, false))),
                Err(ExchangeError::Rejected { status, body }) => {
                    warn!("[OAuth] Google rejected refresh (HTTP {}): {}", status, body);
                    Err(token_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_grant",
                        "Refresh token was rejected",
                    ))
                }
                Err(ExchangeError::Transport(err)) => {
                    error!("[OAuth] Refresh request failed: {}", err);
                    Err(token_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "server_error",
                        "Could not reach Google to refresh the token",
                    ))
                }
            }
        }
        Some(other) => {
            warn!("[OAuth] Unsupported grant_type: {}", other);
            Err(token_error(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                "Only authorization_code and refresh_token grants are supported",
            ))
        }
        None => {
            warn!("[OAuth] Missing grant_type");
            Err(token_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Missing grant_type",
            ))
        }
    }
}

fn token_error(
    status: StatusCode,
    error: &str,
    description: &str,
) -> (StatusCode, Json<TokenErrorResponse>) {
    (
        status,
        Json(TokenErrorResponse {
            error: error.to_string(),
            error_description: Some(description.to_string()),
        }),
    )
}

// ============================================================================
// Dynamic Client Registration (RFC 7591)
// ============================================================================

/// POST /oauth/register - register a client, get a client id.
pub async fn oauth_register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> (StatusCode, Json<RegisterResponse>) {
    let swept = state.registered_clients.sweep_expired();
    if swept > 0 {
        debug!("[DCR] Swept {} expired registration(s)", swept);
    }

    info!(
        "[DCR] Registration request from: {:?} (redirect_uris: {:?})",
        request.client_name, request.redirect_uris
    );

    let (stored, response) = process_registration(request);
    state
        .registered_clients
        .put(response.client_id.clone(), stored);

    info!(
        "[DCR] Registered client: {} ({})",
        response.client_name, response.client_id
    );
    (StatusCode::CREATED, Json(response))
}

// ============================================================================
// SSE transport (legacy)
// ============================================================================

/// Removes the session when the SSE stream is dropped, which is how
/// client disconnects surface here.
struct SessionCleanup {
    state: Arc<AppState>,
    session_id: String,
}

impl Drop for SessionCleanup {
    fn drop(&mut self) {
        self.state.sessions.remove(&self.session_id);
    }
}

/// GET /sse - open the legacy event stream.
///
/// The first event tells the client where to POST its messages; every
/// JSON-RPC response after that arrives as a `message` event.
pub async fn sse_connect(
    State(state): State<Arc<AppState>>,
    auth: Option<AuthContext>,
) -> Response {
    let session_id = state.sessions.create(TransportFamily::Sse, auth);
    let (tx, mut rx) = mpsc::channel::<Value>(PUSH_CHANNEL_CAPACITY);
    if let Err(err) = state
        .sessions
        .attach_push(&session_id, TransportFamily::Sse, tx)
    {
        warn!("[SSE] Could not attach push channel: {}", err);
    }

    info!("[SSE] Stream opened: {}", session_id);
    let endpoint = format!("/message?sessionId={}", session_id);
    let cleanup = SessionCleanup {
        state: state.clone(),
        session_id,
    };

    let stream = async_stream::stream! {
        let _cleanup = cleanup;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(data) => yield Ok(Event::default().event("message").data(data)),
                Err(err) => warn!("[SSE] Dropping unserializable message: {}", err),
            }
        }
        debug!("[SSE] Push channel closed");
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct MessageParams {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// POST /message?sessionId=... - deliver a client message to its stream.
///
/// Responds 202 immediately; the JSON-RPC response goes out over the
/// session's event stream once dispatch finishes.
pub async fn sse_message(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MessageParams>,
    Json(message): Json<Value>,
) -> Response {
    let Some(session_id) = params.session_id else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing sessionId query parameter",
        )
            .into_response();
    };

    let session = match state.sessions.get(&session_id, TransportFamily::Sse) {
        Ok(session) => session,
        Err(SessionError::NotFound(_)) => {
            warn!("[SSE] Message for unknown session: {}", session_id);
            return (StatusCode::NOT_FOUND, "Session not found").into_response();
        }
        Err(err @ SessionError::WrongFamily { .. }) => {
            warn!("[SSE] {}", err);
            return (
                StatusCode::BAD_REQUEST,
                "Session belongs to a different transport protocol",
            )
                .into_response();
        }
    };

    let auth = effective_auth(session.auth.clone(), &state);
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let Some(response) = dispatcher.handle(message, &auth).await else {
            return;
        };
        match session.push {
            Some(push) => {
                if push.send(response).await.is_err() {
                    debug!("[SSE] Stream closed before the response was delivered");
                }
            }
            None => warn!("[SSE] Session has no push channel attached"),
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

// ============================================================================
// Streamable HTTP transport
// ============================================================================

/// Detaches the push stream on drop without closing the session; the
/// client may reattach with another GET.
struct PushCleanup {
    state: Arc<AppState>,
    session_id: String,
}

impl Drop for PushCleanup {
    fn drop(&mut self) {
        self.state.sessions.detach_push(&self.session_id);
    }
}

/// POST /mcp - the request/response leg of the streamable transport.
///
/// An `initialize` request without a session header opens a session and
/// returns its id in the `Mcp-Session-Id` response header; every other
/// request must echo that header back.
pub async fn mcp_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: Option<AuthContext>,
    Json(message): Json<Value>,
) -> Response {
    let session_header = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok());

    let Some(session_id) = session_header else {
        let is_initialize =
            message.get("method").and_then(Value::as_str) == Some("initialize");
        if !is_initialize {
            return (
                StatusCode::BAD_REQUEST,
                Json(protocol::error_response(
                    Value::Null,
                    error_codes::INVALID_REQUEST,
                    "Missing Mcp-Session-Id header",
                )),
            )
                .into_response();
        }

        let session_id = state
            .sessions
            .create(TransportFamily::StreamableHttp, auth.clone());
        let effective = effective_auth(auth, &state);
        let response = state.dispatcher.handle(message, &effective).await;

        let mut http_response = match response {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        };
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            http_response
                .headers_mut()
                .insert(HeaderName::from_static(MCP_SESSION_HEADER), value);
        }
        return http_response;
    };

    let session = match state
        .sessions
        .get(session_id, TransportFamily::StreamableHttp)
    {
        Ok(session) => session,
        Err(SessionError::NotFound(_)) => {
            warn!("[MCP] Request for unknown session: {}", session_id);
            return (
                StatusCode::NOT_FOUND,
                Json(protocol::error_response(
                    Value::Null,
                    error_codes::INVALID_REQUEST,
                    "Session not found",
                )),
            )
                .into_response();
        }
        Err(err @ SessionError::WrongFamily { .. }) => {
            warn!("[MCP] {}", err);
            return (
                StatusCode::BAD_REQUEST,
                Json(protocol::error_response(
                    Value::Null,
                    error_codes::INVALID_REQUEST,
                    "Session belongs to a different transport protocol",
                )),
            )
                .into_response();
        }
    };

    let effective = effective_auth(auth.or(session.auth), &state);
    match state.dispatcher.handle(message, &effective).await {
        Some(response) => Json(response).into_response(),
        // Notifications produce no body, only an acknowledgement.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// GET /mcp - attach the server-to-client push stream for a session.
pub async fn mcp_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(session_id) = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };

    let (tx, mut rx) = mpsc::channel::<Value>(PUSH_CHANNEL_CAPACITY);
    match state
        .sessions
        .attach_push(&session_id, TransportFamily::StreamableHttp, tx)
    {
        Ok(()) => {}
        Err(SessionError::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, "Session not found").into_response();
        }
        Err(err @ SessionError::WrongFamily { .. }) => {
            warn!("[MCP] {}", err);
            return (
                StatusCode::BAD_REQUEST,
                "Session belongs to a different transport protocol",
            )
                .into_response();
        }
    }

    info!("[MCP] Push stream attached: {}", session_id);
    let cleanup = PushCleanup {
        state: state.clone(),
        session_id,
    };

    let stream = async_stream::stream! {
        let _cleanup = cleanup;
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(data) => yield Ok::<_, Infallible>(Event::default().event("message").data(data)),
                Err(err) => warn!("[MCP] Dropping unserializable message: {}", err),
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// DELETE /mcp - explicit session teardown.
pub async fn mcp_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(session_id) = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };

    match state.sessions.remove(session_id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (StatusCode::NOT_FOUND, "Session not found").into_response(),
    }
}

/// Identity a session message runs under: the request or session
/// identity when one exists, else the server's stored credential, else
/// an empty context whose Drive calls will fail at Google.
fn effective_auth(auth: Option<AuthContext>, state: &AppState) -> AuthContext {
    auth.or_else(|| state.preauth.clone())
        .unwrap_or_else(|| AuthContext {
            access_token: String::new(),
            scopes: Vec::new(),
            email: None,
        })
}

// ============================================================================
// HTML pages for the browser legs of the flow
// ============================================================================

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            background: #f4f5f7;
            color: #1f2533;
            padding: 1rem;
        }}
        .card {{
            background: #fff;
            border: 1px solid #e3e6eb;
            border-radius: 12px;
            padding: 2rem;
            max-width: 480px;
            width: 100%;
        }}
        h1 {{ font-size: 1.25rem; margin-bottom: 0.75rem; }}
        p {{ color: #5a6272; line-height: 1.5; margin-bottom: 1rem; }}
        code {{
            display: block;
            background: #f0f1f4;
            border-radius: 8px;
            padding: 0.75rem;
            font-size: 0.8rem;
            word-break: break-all;
            margin-bottom: 1rem;
        }}
        .error {{ color: #b00020; }}
    </style>
</head>
<body>
    <div class="card">
{body}
    </div>
</body>
</html>"#
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn failure_page(status: StatusCode, error: &str, description: &str) -> Response {
    let body = format!(
        "        <h1 class=\"error\">Authorization failed</h1>\n        \
         <p><strong>{}</strong>: {}</p>\n        \
         <p>You can close this tab and start over from your MCP client.</p>",
        html_escape(error),
        html_escape(description)
    );
    (status, Html(page("Authorization failed", &body))).into_response()
}

fn token_page(tokens: &TokenSet) -> Response {
    let refresh_block = match tokens.refresh_token.as_deref() {
        Some(refresh_token) => format!(
            "        <p>Refresh token:</p>\n        <code>{}</code>\n",
            html_escape(refresh_token)
        ),
        None => String::new(),
    };
    let body = format!(
        "        <h1>Authorization complete</h1>\n        \
         <p>Send this access token as <strong>Authorization: Bearer &lt;token&gt;</strong> \
         on requests to this server.</p>\n        \
         <code>{}</code>\n{}        \
         <p>You can close this tab.</p>",
        html_escape(&tokens.access_token),
        refresh_block
    );
    Html(page("Authorization complete", &body)).into_response()
}

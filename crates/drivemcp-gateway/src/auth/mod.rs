//! Bearer-token authentication for the gateway.
//!
//! Every request to a protected route is validated against Google's
//! tokeninfo endpoint. Validation results are never cached, so a token
//! revoked at Google stops working on the next request.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, OptionalFromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use drivemcp_core::{scopes::grants_drive_access, DriveClient};

use crate::oauth::ExchangeError;
use crate::server::AppState;

/// How strictly the gateway enforces bearer authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Every protected request must carry a valid Google token.
    #[default]
    Required,
    /// Requests without a header fall back to the server's own stored
    /// credential. A header that is present must still validate.
    Optional,
    /// All requests run under the server's stored credential.
    Disabled,
}

impl AuthPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// The identity a request runs under, attached by the middleware and
/// picked up by handlers through the extractor impl.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub access_token: String,
    pub scopes: Vec<String>,
    pub email: Option<String>,
}

impl AuthContext {
    /// Drive client bound to this request's token.
    pub fn drive_client(&self, base_url: &str) -> DriveClient {
        DriveClient::with_base_url(self.access_token.clone(), base_url)
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthContext>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "invalid_token",
                    "error_description": "No authentication context for this request",
                })),
            )
                .into_response()
        })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthContext>().cloned())
    }
}

/// Routes that must stay reachable without a token: health probes, the
/// OAuth flow itself, and discovery metadata. `/message` is listed
/// because SSE clients authenticate when the stream is opened; the
/// posted messages are tied to that session.
fn is_public_path(path: &str) -> bool {
    path == "/health"
        || path == "/message"
        || path.starts_with("/oauth/")
        || path.starts_with("/.well-known/")
}

/// Gate protected routes behind Google token validation.
pub async fn bearer_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // CORS preflights carry no credentials.
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let base_url = state.config.public_base_url(request.headers());

    match state.config.auth_policy {
        AuthPolicy::Disabled => {
            if let Some(preauth) = state.preauth.clone() {
                request.extensions_mut().insert(preauth);
            }
            next.run(request).await
        }
        AuthPolicy::Required => match validate_bearer(&state, request.headers(), &base_url).await {
            Ok(auth) => {
                request.extensions_mut().insert(auth);
                next.run(request).await
            }
            Err(response) => response,
        },
        AuthPolicy::Optional => {
            let has_header = request.headers().contains_key(header::AUTHORIZATION);
            match validate_bearer(&state, request.headers(), &base_url).await {
                Ok(auth) => {
                    request.extensions_mut().insert(auth);
                    next.run(request).await
                }
                // A header that fails validation is rejected even in
                // optional mode; only the absence of one falls through.
                Err(response) if has_header => response,
                Err(response) => match state.preauth.clone() {
                    Some(preauth) => {
                        request.extensions_mut().insert(preauth);
                        next.run(request).await
                    }
                    None => response,
                },
            }
        }
    }
}

async fn validate_bearer(
    state: &AppState,
    headers: &HeaderMap,
    base_url: &str,
) -> Result<AuthContext, Response> {
    let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        debug!("[Auth] No Authorization header on protected route");
        return Err(unauthorized_response(
            base_url,
            "invalid_token",
            "Missing Authorization header",
        ));
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        warn!("[Auth] Authorization header is not a Bearer token");
        return Err(unauthorized_response(
            base_url,
            "invalid_request",
            "Authorization header must use the Bearer scheme",
        ));
    };

    let info = match state.google_client().tokeninfo(token).await {
        Ok(info) => info,
        Err(ExchangeError::Rejected { status, .. }) => {
            debug!("[Auth] Google rejected token (HTTP {})", status);
            return Err(unauthorized_response(
                base_url,
                "invalid_token",
                "Token is invalid or expired",
            ));
        }
        Err(ExchangeError::Transport(err)) => {
            warn!("[Auth] Token validation unreachable: {}", err);
            return Err(unauthorized_response(
                base_url,
                "invalid_token",
                "Token could not be validated",
            ));
        }
    };

    let scopes = info.scopes();
    if !grants_drive_access(&scopes) {
        warn!(
            "[Auth] Token for {:?} lacks Drive scope (granted: {:?})",
            info.email, scopes
        );
        return Err(forbidden_response(
            "insufficient_scope",
            "Token is missing the required Google Drive scopes",
        ));
    }

    debug!("[Auth] Valid token for {:?}", info.email);
    Ok(AuthContext {
        access_token: token.to_string(),
        scopes,
        email: info.email,
    })
}

/// 401 with OAuth discovery pointers. Per RFC 9728 the WWW-Authenticate
/// header carries `resource_metadata`, and a Link header points at the
/// same document for clients that only look there.
fn unauthorized_response(base_url: &str, error: &str, description: &str) -> Response {
    let resource_metadata_url = format!("{}/.well-known/oauth-protected-resource", base_url);

    let www_authenticate = format!(
        r#"Bearer realm="drivemcp", error="{}", error_description="{}", resource_metadata="{}""#,
        error, description, resource_metadata_url
    );
    let link = format!(r#"<{}>; rel="oauth-protected-resource""#, resource_metadata_url);

    let body = json!({
        "error": error,
        "error_description": description,
        "resource_metadata": resource_metadata_url,
    });

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, www_authenticate), (header::LINK, link)],
        Json(body),
    )
        .into_response()
}

fn forbidden_response(error: &str, description: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": error,
            "error_description": description,
        })),
    )
        .into_response()
}

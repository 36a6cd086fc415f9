//! Dynamic client registration (RFC 7591).
//!
//! Registration here is bookkeeping, not security: MCP clients expect the
//! endpoint to exist, but every token this gateway mints is backed by a
//! Google credential, so client identity is never load-bearing. The
//! gateway accepts whatever metadata the client sends and echoes it back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::RegisteredClient;

/// Client metadata from a registration request. Every field is optional;
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    #[serde(default)]
    pub response_types: Option<Vec<String>>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Registration response per RFC 7591 section 3.2.1.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub client_id_issued_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Mint a short client identifier: `mcp_` plus the first eight hex
/// characters of a v4 UUID.
pub fn mint_client_id() -> String {
    format!("mcp_{}", &Uuid::new_v4().to_string()[..8])
}

/// Fill in defaults for omitted metadata and produce both the stored
/// record and the response body.
pub fn process_registration(request: RegisterRequest) -> (RegisteredClient, RegisterResponse) {
    let client_id = mint_client_id();
    let client_name = request
        .client_name
        .unwrap_or_else(|| "MCP Client".to_string());
    let issued_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let stored = RegisteredClient {
        client_name: client_name.clone(),
        redirect_uris: request.redirect_uris.clone(),
    };

    let response = RegisterResponse {
        client_id,
        client_name,
        redirect_uris: request.redirect_uris,
        grant_types: request.grant_types.unwrap_or_else(|| {
            vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]
        }),
        response_types: request
            .response_types
            .unwrap_or_else(|| vec!["code".to_string()]),
        token_endpoint_auth_method: request
            .token_endpoint_auth_method
            .unwrap_or_else(|| "none".to_string()),
        client_id_issued_at: issued_at,
        scope: request.scope,
    };

    (stored, response)
}

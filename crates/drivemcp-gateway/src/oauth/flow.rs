//! Authorization-code flow against Google's OAuth endpoints.
//!
//! The gateway is the confidential client here: it holds the real client
//! keys, sends user agents to Google's consent page, and performs the
//! code and refresh exchanges server-side.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;

use drivemcp_core::GoogleKeys;

use super::token::{GoogleTokenResponse, TokenSet};
use super::GoogleEndpoints;

/// Why a call to Google failed. Handlers map rejections and transport
/// failures to different OAuth error codes.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Google rejected the request: HTTP {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("could not reach Google: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Claims reported by Google's tokeninfo endpoint for a bearer token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TokenInfo {
    /// Scopes granted to the token, split from the space-separated form.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Stateless client for Google's OAuth endpoints. Cheap to construct;
/// callers build one per operation instead of caching, so key or
/// endpoint changes never need invalidation anywhere.
#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    http_client: reqwest::Client,
    endpoints: GoogleEndpoints,
    client_id: String,
    client_secret: String,
}

impl GoogleOAuthClient {
    pub fn new(keys: &GoogleKeys, endpoints: GoogleEndpoints) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoints,
            client_id: keys.client_id.clone(),
            client_secret: keys.client_secret.clone(),
        }
    }

    /// Build the consent-page URL the user agent is sent to.
    ///
    /// `access_type=offline` plus `prompt=consent` makes Google return a
    /// refresh token on every exchange, not only the first one per user.
    pub fn consent_url(
        &self,
        redirect_uri: &str,
        state: &str,
        scopes: &[&str],
    ) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(&self.endpoints.auth_url)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", &scopes.join(" "));
            query.append_pair("state", state);
            query.append_pair("access_type", "offline");
            query.append_pair("prompt", "consent");
        }
        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, ExchangeError> {
        debug!("[OAuth] Exchanging authorization code with Google");
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        self.token_request(&params).await
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ExchangeError> {
        debug!("[OAuth] Refreshing access token with Google");
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        self.token_request(&params).await
    }

    /// Ask Google what a bearer token is good for.
    pub async fn tokeninfo(&self, access_token: &str) -> Result<TokenInfo, ExchangeError> {
        let response = self
            .http_client
            .get(&self.endpoints.tokeninfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn token_request(
        &self,
        params: &HashMap<&str, &str>,
    ) -> Result<TokenSet, ExchangeError> {
        let response = self
            .http_client
            .post(&self.endpoints.token_url)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: GoogleTokenResponse = response.json().await?;
        Ok(token_response.into())
    }
}

/// Generate a high-entropy CSRF state value.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Mint a single-use proxy authorization code.
pub fn generate_proxy_code() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("gdp_{}", URL_SAFE_NO_PAD.encode(bytes))
}

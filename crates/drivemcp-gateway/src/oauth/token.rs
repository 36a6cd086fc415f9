//! Token types for exchanges with Google's token endpoint.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fallback lifetime relayed when Google omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Raw response body from Google's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Tokens captured from an exchange, held while a proxy code is pending.
///
/// The relative `expires_in` is pinned to an absolute instant at capture
/// time so the remaining lifetime stays correct however long the code
/// sits unredeemed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl From<GoogleTokenResponse> for TokenSet {
    fn from(response: GoogleTokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            scope: response.scope,
        }
    }
}

impl TokenSet {
    /// Remaining lifetime in whole seconds, for relaying as `expires_in`.
    /// Already-expired tokens report zero rather than going negative.
    pub fn expires_in_secs(&self) -> i64 {
        match self.expires_at {
            Some(at) => (at - Utc::now()).num_seconds().max(0),
            None => DEFAULT_EXPIRES_IN_SECS,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Utc::now())
    }
}

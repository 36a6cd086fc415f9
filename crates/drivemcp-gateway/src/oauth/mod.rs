//! OAuth proxy between MCP clients and Google.
//!
//! The gateway terminates the client-facing leg of the flow: clients
//! authorize against this server, which forwards consent to Google and
//! trades the resulting codes and refresh tokens on their behalf. The
//! real Google client keys never leave this process.

mod dcr;
mod flow;
mod store;
mod token;

pub use dcr::{mint_client_id, process_registration, RegisterRequest, RegisterResponse};
pub use flow::{
    generate_proxy_code, generate_state, ExchangeError, GoogleOAuthClient, TokenInfo,
};
pub use store::{
    PendingAuthorization, RegisteredClient, TtlStore, CODE_TTL_SECS, REGISTRATION_TTL_SECS,
    STATE_TTL_SECS,
};
pub use token::{GoogleTokenResponse, TokenSet};

/// Where the Google leg of the flow lives. Tests point these at a mock
/// server; production uses the defaults.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub tokeninfo_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".to_string(),
        }
    }
}

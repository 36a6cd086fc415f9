//! Google OAuth client keys and pre-provisioned user credentials.
//!
//! Client keys come from environment variables first, then from an optional
//! JSON key file in the shape Google Cloud Console exports (an `installed`
//! or `web` object, or the bare fields at the top level).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

/// Environment variable holding the OAuth client id.
pub const ENV_CLIENT_ID: &str = "DRIVEMCP_CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "DRIVEMCP_CLIENT_SECRET";
/// Environment variable pointing at a Google client keys JSON file.
pub const ENV_KEYS_FILE: &str = "DRIVEMCP_KEYS_FILE";
/// Environment variable pointing at a stored user credential JSON file.
pub const ENV_CREDENTIALS_FILE: &str = "DRIVEMCP_CREDENTIALS_FILE";

/// OAuth client identity registered with Google.
#[derive(Clone, Default, Deserialize)]
pub struct GoogleKeys {
    pub client_id: String,
    pub client_secret: String,
}

// The secret stays out of debug output and logs.
impl std::fmt::Debug for GoogleKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleKeys")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A user credential provisioned outside the gateway flow, e.g. by a
/// one-time interactive login on an operator machine.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<chrono::DateTime<chrono::Utc>>,
}

/// Key files exported by Google nest the client under `installed` or `web`.
#[derive(Debug, Default, Deserialize)]
struct KeyFile {
    #[serde(default)]
    installed: Option<GoogleKeys>,
    #[serde(default)]
    web: Option<GoogleKeys>,
}

fn parse_keys(raw: &str) -> Result<GoogleKeys> {
    let file: KeyFile = serde_json::from_str(raw)?;
    if let Some(keys) = file.installed.or(file.web) {
        return Ok(keys);
    }
    // Flat shape: client_id / client_secret at the top level
    serde_json::from_str::<GoogleKeys>(raw).map_err(|_| {
        CoreError::Credentials(
            "key file has no installed, web, or top-level client entry".to_string(),
        )
    })
}

/// Source of the server's Google client keys and optional stored credential.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// The OAuth client this server authenticates to Google as.
    async fn google_keys(&self) -> Result<GoogleKeys>;

    /// A pre-provisioned user credential, if one is configured.
    async fn stored_credential(&self) -> Result<Option<StoredCredential>>;
}

/// Resolves keys from the environment, falling back to JSON files.
#[derive(Debug, Clone, Default)]
pub struct FileKeyProvider {
    keys_file: Option<PathBuf>,
    credentials_file: Option<PathBuf>,
}

impl FileKeyProvider {
    pub fn new(keys_file: Option<PathBuf>, credentials_file: Option<PathBuf>) -> Self {
        Self {
            keys_file,
            credentials_file,
        }
    }

    /// Pick up file locations from the environment.
    pub fn from_env() -> Self {
        Self {
            keys_file: std::env::var(ENV_KEYS_FILE).ok().map(PathBuf::from),
            credentials_file: std::env::var(ENV_CREDENTIALS_FILE).ok().map(PathBuf::from),
        }
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    async fn google_keys(&self) -> Result<GoogleKeys> {
        if let (Ok(client_id), Ok(client_secret)) =
            (std::env::var(ENV_CLIENT_ID), std::env::var(ENV_CLIENT_SECRET))
        {
            if !client_id.is_empty() {
                debug!("Using OAuth client keys from environment");
                return Ok(GoogleKeys {
                    client_id,
                    client_secret,
                });
            }
        }

        let Some(path) = &self.keys_file else {
            return Err(CoreError::Config(format!(
                "no OAuth client keys: set {}/{} or {}",
                ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_KEYS_FILE
            )));
        };

        let raw = tokio::fs::read_to_string(path).await?;
        let keys = parse_keys(&raw)?;
        debug!("Loaded OAuth client keys from {}", path.display());
        Ok(keys)
    }

    async fn stored_credential(&self) -> Result<Option<StoredCredential>> {
        let Some(path) = &self.credentials_file else {
            return Ok(None);
        };

        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("Credentials file {} not found", path.display());
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let credential: StoredCredential = serde_json::from_str(&raw)
            .map_err(|err| CoreError::Credentials(format!("invalid credentials file: {}", err)))?;
        Ok(Some(credential))
    }
}

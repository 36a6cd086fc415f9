//! Thin async client for the Google Drive v3 REST API.
//!
//! Google Workspace documents have no byte representation of their own and
//! must be exported to a concrete format; everything else is downloaded
//! as-is with `alt=media`.

use serde::Deserialize;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Production Drive API base.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Metadata fields requested for listings and lookups.
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,size";

/// A file as reported by the Drive API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

/// One page of a file listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// File content after export/download resolution.
#[derive(Debug, Clone)]
pub enum FileContent {
    Text { mime_type: String, body: String },
    Binary { mime_type: String, data: Vec<u8> },
}

impl FileContent {
    pub fn mime_type(&self) -> &str {
        match self {
            FileContent::Text { mime_type, .. } => mime_type,
            FileContent::Binary { mime_type, .. } => mime_type,
        }
    }
}

/// Export target for a Google Workspace mime type. `None` means the file
/// has real bytes and should be downloaded instead.
pub fn export_mime_for(source_mime: &str) -> Option<&'static str> {
    match source_mime {
        "application/vnd.google-apps.document" => Some("text/markdown"),
        "application/vnd.google-apps.spreadsheet" => Some("text/csv"),
        "application/vnd.google-apps.presentation" => Some("text/plain"),
        "application/vnd.google-apps.drawing" => Some("image/png"),
        other if other.starts_with("application/vnd.google-apps") => Some("text/plain"),
        _ => None,
    }
}

/// Escape user input for embedding in a Drive `q` expression.
pub fn escape_query(query: &str) -> String {
    query.replace('\\', "\\\\").replace('\'', "\\'")
}

fn is_textual(mime_type: &str) -> bool {
    mime_type.starts_with("text/")
        || mime_type == "application/json"
        || mime_type.ends_with("+json")
        || mime_type.ends_with("+xml")
}

/// Per-request Drive client carrying one caller's access token.
///
/// Construction is cheap; handlers build one per request rather than
/// sharing clients across callers.
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DRIVE_API_BASE)
    }

    /// Point the client at a different API base (used by tests).
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Full-text search across the caller's files.
    pub async fn search(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList> {
        let q = format!("fullText contains '{}'", escape_query(query));
        self.list(Some(&q), page_size, page_token).await
    }

    /// List files, optionally filtered by a raw `q` expression.
    pub async fn list(
        &self,
        q: Option<&str>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList> {
        let url = format!("{}/files", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("pageSize", page_size.clamp(1, 100).to_string()),
            ("fields", format!("nextPageToken,files({})", FILE_FIELDS)),
        ];
        if let Some(q) = q {
            params.push(("q", q.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;
        Self::json_body(response).await
    }

    /// Fetch metadata for a single file.
    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        let url = format!("{}/files/{}", self.base_url, urlencoding::encode(file_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;
        Self::json_body(response).await
    }

    /// Download the raw bytes of a non-Workspace file.
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/files/{}", self.base_url, urlencoding::encode(file_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        Self::raw_body(response).await
    }

    /// Export a Google Workspace document to the given mime type.
    pub async fn export(&self, file_id: &str, mime_type: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/files/{}/export",
            self.base_url,
            urlencoding::encode(file_id)
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("mimeType", mime_type)])
            .send()
            .await?;
        Self::raw_body(response).await
    }

    /// Read a file end to end: exports Workspace documents, downloads the
    /// rest, and decodes textual content to a string.
    pub async fn read_file(&self, file_id: &str) -> Result<(DriveFile, FileContent)> {
        let file = self.get_file(file_id).await?;

        let content = match export_mime_for(&file.mime_type) {
            Some(export_mime) => {
                debug!("Exporting {} ({}) as {}", file.id, file.mime_type, export_mime);
                let data = self.export(file_id, export_mime).await?;
                if export_mime.starts_with("text/") {
                    FileContent::Text {
                        mime_type: export_mime.to_string(),
                        body: String::from_utf8_lossy(&data).into_owned(),
                    }
                } else {
                    FileContent::Binary {
                        mime_type: export_mime.to_string(),
                        data,
                    }
                }
            }
            None => {
                let data = self.download(file_id).await?;
                if is_textual(&file.mime_type) {
                    FileContent::Text {
                        mime_type: file.mime_type.clone(),
                        body: String::from_utf8_lossy(&data).into_owned(),
                    }
                } else {
                    FileContent::Binary {
                        mime_type: file.mime_type.clone(),
                        data,
                    }
                }
            }
        };

        Ok((file, content))
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn raw_body(response: reqwest::Response) -> Result<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

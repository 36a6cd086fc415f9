//! # DriveMCP Core Library
//!
//! Domain logic for the Google Drive MCP server.
//!
//! ## Modules
//!
//! - `credentials` - Google OAuth client keys and stored user credentials
//! - `drive` - Thin async client for the Google Drive v3 REST API
//! - `error` - Shared error type
//! - `scopes` - OAuth scopes this server requests and requires

pub mod credentials;
pub mod drive;
pub mod error;
pub mod scopes;

// Re-export commonly used types
pub use credentials::{FileKeyProvider, GoogleKeys, KeyProvider, StoredCredential};
pub use drive::{DriveClient, DriveFile, FileContent, FileList};
pub use error::{CoreError, Result};

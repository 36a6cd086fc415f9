//! OAuth scopes requested from Google and required of callers.

/// Read-only access to file content.
pub const DRIVE_READONLY: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Read-only access to file metadata.
pub const DRIVE_METADATA_READONLY: &str =
    "https://www.googleapis.com/auth/drive.metadata.readonly";

/// Scopes requested during the consent flow.
pub const REQUIRED_SCOPES: [&str; 2] = [DRIVE_READONLY, DRIVE_METADATA_READONLY];

/// Space-separated scope string for authorization requests.
pub fn scope_string() -> String {
    REQUIRED_SCOPES.join(" ")
}

/// Whether a granted scope set carries at least one of the Drive scopes
/// this server requires. Tokens granted neither scope cannot reach the
/// Drive API and are rejected up front.
pub fn grants_drive_access<S: AsRef<str>>(granted: &[S]) -> bool {
    granted
        .iter()
        .any(|scope| REQUIRED_SCOPES.contains(&scope.as_ref()))
}

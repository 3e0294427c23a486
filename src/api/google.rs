use std::path::Path;

use serde::Deserialize;

use crate::error::SyncError;

#[derive(Deserialize)]
struct TokenFile {
    token: Option<String>,
    access_token: Option<String>,
}

/// Bearer token from a saved OAuth token file (`token` or `access_token`).
/// Refreshing is left to whatever tool wrote the file.
pub fn load_access_token(path: &Path, service: &'static str) -> Result<String, SyncError> {
    let remedy = || format!("re-authenticate and save a fresh token to {}", path.display());

    let raw = std::fs::read_to_string(path).map_err(|_| SyncError::Auth {
        service,
        remedy: remedy(),
    })?;
    let parsed: TokenFile = serde_json::from_str(&raw).map_err(|_| SyncError::Auth {
        service,
        remedy: remedy(),
    })?;

    parsed
        .token
        .or(parsed.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::Auth {
            service,
            remedy: remedy(),
        })
}

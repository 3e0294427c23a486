use std::path::PathBuf;

use thiserror::Error;

/// Typed outcome of every collaborator call (HTTP clients, snapshot I/O, extraction).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{service} authentication failed: {remedy}")]
    Auth { service: &'static str, remedy: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("record {url} has no sink id")]
    MissingId { url: String },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Only bad credentials stop a run; everything else is per-item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Auth { .. })
    }
}

/// Map a non-2xx response into `Auth` (401/403) or `Http`.
pub async fn check_status(
    service: &'static str,
    remedy: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(SyncError::Auth {
            service,
            remedy: format!("{} (HTTP {}: {})", remedy, status.as_u16(), body.trim()),
        });
    }
    Err(SyncError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_is_fatal() {
        let auth = SyncError::Auth {
            service: "notion",
            remedy: "set NOTION_KEY".into(),
        };
        assert!(auth.is_fatal());
        assert!(!SyncError::Http { status: 429, body: String::new() }.is_fatal());
        assert!(!SyncError::MissingId { url: "a".into() }.is_fatal());
    }

    #[test]
    fn auth_message_names_remedy() {
        let e = SyncError::Auth {
            service: "gmail",
            remedy: "re-run the consent flow".into(),
        };
        assert_eq!(e.to_string(), "gmail authentication failed: re-run the consent flow");
    }
}

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SyncError;

const DEFAULT_NOTION_BASE: &str = "https://api.notion.com/v1";
const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_YOUTUBE_BASE: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_REQUEST_DELAY_MS: u64 = 200;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Process-wide settings, read once at start-up and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub notion_key: Option<String>,
    pub notion_database_id: Option<String>,
    pub notion_base_url: String,
    pub notion_version: String,
    pub google_token_path: PathBuf,
    pub gmail_base_url: String,
    pub youtube_base_url: String,
    pub youtube_channel_id: Option<String>,
    /// Spacing between consecutive mutating requests to a sink.
    pub request_delay: Duration,
    pub poll_interval: Duration,
    pub log_dir: PathBuf,
}

/// Credentials for one Notion database.
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub key: String,
    pub database_id: String,
    pub base_url: String,
    pub version: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let millis = |k: &str, default: u64| {
            get(k).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
        };

        Self {
            notion_key: get("NOTION_KEY"),
            notion_database_id: get("NOTION_DATABASE_ID"),
            notion_base_url: get("NOTION_API_BASE").unwrap_or_else(|| DEFAULT_NOTION_BASE.into()),
            notion_version: get("NOTION_VERSION").unwrap_or_else(|| DEFAULT_NOTION_VERSION.into()),
            google_token_path: get("GOOGLE_TOKEN_PATH")
                .unwrap_or_else(|| "token.json".into())
                .into(),
            gmail_base_url: get("GMAIL_API_BASE").unwrap_or_else(|| DEFAULT_GMAIL_BASE.into()),
            youtube_base_url: get("YOUTUBE_API_BASE").unwrap_or_else(|| DEFAULT_YOUTUBE_BASE.into()),
            youtube_channel_id: get("YOUTUBE_CHANNEL_ID"),
            request_delay: Duration::from_millis(millis(
                "SYNC_REQUEST_DELAY_MS",
                DEFAULT_REQUEST_DELAY_MS,
            )),
            poll_interval: Duration::from_secs(millis(
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".into()).into(),
        }
    }

    /// Notion credentials, or an auth error naming what to set.
    pub fn notion(&self) -> Result<NotionSettings, SyncError> {
        let missing = |var: &str| SyncError::Auth {
            service: "notion",
            remedy: format!("set {} (environment or .env) and share the database with the integration", var),
        };
        let key = self.notion_key.clone().ok_or_else(|| missing("NOTION_KEY"))?;
        let database_id = self
            .notion_database_id
            .clone()
            .ok_or_else(|| missing("NOTION_DATABASE_ID"))?;
        Ok(NotionSettings {
            key,
            database_id,
            base_url: self.notion_base_url.trim_end_matches('/').to_string(),
            version: self.notion_version.clone(),
        })
    }
}

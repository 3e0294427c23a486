use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::{collect_pages, http_client, Page};
use crate::error::{check_status, SyncError};
use crate::record::Record;

const REMEDY: &str = "re-authenticate with the gmail.readonly scope";
// Newest messages inspected per watch check.
const WATCH_PAGE_SIZE: u32 = 20;

// Gmail returns url-safe base64, with or without padding.
static URL_SAFE_ANY: LazyLock<GeneralPurpose> = LazyLock::new(|| {
    GeneralPurpose::new(
        &alphabet::URL_SAFE,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub snippet: String,
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    pub attachment_id: Option<String>,
}

#[derive(Deserialize)]
struct AttachmentBody {
    data: String,
}

/// An attachment reference found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
    pub attachment_id: String,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    /// Every part (at any depth) carrying a filename and an attachment id.
    pub fn attachments(&self) -> Vec<AttachmentRef> {
        let mut found = Vec::new();
        collect_attachments(&self.payload, &mut found);
        found
    }

    pub fn to_record(&self) -> Record {
        let title = self
            .subject()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.snippet)
            .trim()
            .to_string();
        let time = self
            .header("Date")
            .map(str::to_string)
            .or_else(|| self.internal_date.as_deref().and_then(millis_to_rfc3339));
        Record {
            url: format!("https://mail.google.com/mail/u/0/#all/{}", self.id),
            title,
            time,
            id: None,
        }
    }
}

fn collect_attachments(part: &MessagePart, out: &mut Vec<AttachmentRef>) {
    if let Some(id) = &part.body.attachment_id {
        if !part.filename.is_empty() {
            out.push(AttachmentRef {
                filename: part.filename.clone(),
                attachment_id: id.clone(),
            });
        }
    }
    for child in &part.parts {
        collect_attachments(child, out);
    }
}

fn millis_to_rfc3339(ms: &str) -> Option<String> {
    let ms: i64 = ms.parse().ok()?;
    DateTime::<Utc>::from_timestamp_millis(ms).map(|t| t.to_rfc3339())
}

pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GmailClient {
    pub fn new(base_url: &str, token: String) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let req = self.http.get(url).bearer_auth(&self.token).query(query);
        let resp = check_status("gmail", REMEDY, req.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Ids of every message matching a Gmail search query.
    pub async fn list_messages(&self, q: &str) -> Result<Vec<MessageRef>, SyncError> {
        let url = format!("{}/messages", self.base_url);
        collect_pages(|token| {
            let mut query = vec![("q", q.to_string())];
            if let Some(t) = token {
                query.push(("pageToken", t));
            }
            let url = url.as_str();
            async move {
                let body: ListResponse = self.get_json(url, &query).await?;
                Ok(Page {
                    items: body.messages,
                    next: body.next_page_token,
                })
            }
        })
        .await
    }

    /// First page only, newest first, at most `max` ids.
    pub async fn recent_messages(&self, q: &str, max: u32) -> Result<Vec<MessageRef>, SyncError> {
        let url = format!("{}/messages", self.base_url);
        let query = [("q", q.to_string()), ("maxResults", max.to_string())];
        let body: ListResponse = self.get_json(&url, &query).await?;
        Ok(body.messages)
    }

    pub async fn get_message(&self, id: &str) -> Result<Message, SyncError> {
        self.get_json(&format!("{}/messages/{}", self.base_url, id), &[])
            .await
    }

    /// Decoded attachment bytes.
    pub async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, SyncError> {
        let url = format!(
            "{}/messages/{}/attachments/{}",
            self.base_url, message_id, attachment_id
        );
        let body: AttachmentBody = self.get_json(&url, &[]).await?;
        URL_SAFE_ANY
            .decode(body.data.trim())
            .map_err(|e| SyncError::Decode(e.to_string()))
    }

    /// Messages matching `q` as records. A message that fails to load is skipped.
    pub async fn message_records(&self, q: &str) -> Result<Vec<Record>, SyncError> {
        let refs = self.list_messages(q).await?;
        let mut records = Vec::with_capacity(refs.len());
        for m in &refs {
            match self.get_message(&m.id).await {
                Ok(msg) => records.push(msg.to_record()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Skipping message {}: {}", m.id, e),
            }
        }
        info!("{} messages for {:?}", records.len(), q);
        Ok(records)
    }

    /// Look for messages from `sender` with attachments and save them into
    /// `dir`. Returns the saved paths; empty means nothing was found yet.
    pub async fn fetch_attachments_from(
        &self,
        sender: &str,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, SyncError> {
        info!("Checking mail from {}", sender);
        let refs = self
            .recent_messages(&format!("from:{}", sender), WATCH_PAGE_SIZE)
            .await?;
        if refs.is_empty() {
            info!("No messages from {}", sender);
            return Ok(Vec::new());
        }

        let mut saved = Vec::new();
        for m in &refs {
            let msg = match self.get_message(&m.id).await {
                Ok(msg) => msg,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping message {}: {}", m.id, e);
                    continue;
                }
            };
            if let Some(subject) = msg.subject() {
                info!("Subject: {}", subject);
            }

            for att in msg.attachments() {
                match self.save_attachment(&msg.id, &att, dir).await {
                    Ok(path) => {
                        info!("Saved attachment: {}", path.display());
                        saved.push(path);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("Attachment {} failed: {}", att.filename, e),
                }
            }
            if !saved.is_empty() {
                break;
            }
        }
        Ok(saved)
    }

    async fn save_attachment(
        &self,
        message_id: &str,
        att: &AttachmentRef,
        dir: &Path,
    ) -> Result<PathBuf, SyncError> {
        let data = self.get_attachment(message_id, &att.attachment_id).await?;
        let name = Path::new(&att.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| SyncError::Decode(format!("bad filename {:?}", att.filename)))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SyncError::io(dir, e))?;
        let path = dir.join(name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        Ok(path)
    }
}

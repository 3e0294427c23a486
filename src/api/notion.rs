//! Notion database client: paginated query, page create/update/archive.
//!
//! Rows carry three properties: `title` (title), `url` (url) and `time`
//! (rich text). The page id assigned by Notion becomes `Record::id`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{collect_pages, http_client, Page};
use crate::config::NotionSettings;
use crate::error::{check_status, SyncError};
use crate::record::Record;

const REMEDY: &str = "check NOTION_KEY and that the database is shared with the integration";

#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    settings: NotionSettings,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct CreatedPage {
    id: String,
}

impl NotionClient {
    pub fn new(settings: NotionSettings) -> Self {
        Self {
            http: http_client(),
            settings,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, SyncError> {
        let resp = req
            .bearer_auth(&self.settings.key)
            .header("Notion-Version", &self.settings.version)
            .send()
            .await?;
        check_status("notion", REMEDY, resp).await
    }

    /// All raw pages of the database matching `filter`, across every result page.
    pub async fn query(&self, filter: Option<Value>) -> Result<Vec<Value>, SyncError> {
        let url = self.url(&format!("databases/{}/query", self.settings.database_id));
        collect_pages(|cursor| {
            let mut body = json!({});
            if let Some(f) = &filter {
                body["filter"] = f.clone();
            }
            if let Some(c) = cursor {
                body["start_cursor"] = Value::String(c);
            }
            let req = self.http.post(&url).json(&body);
            async move {
                let page: QueryResponse = self.send(req).await?.json().await?;
                info!("Fetched {} rows from Notion", page.results.len());
                Ok(Page {
                    items: page.results,
                    next: page.next_cursor.filter(|_| page.has_more),
                })
            }
        })
        .await
    }

    /// Every row of the database as a record carrying its page id.
    pub async fn fetch_records(&self) -> Result<Vec<Record>, SyncError> {
        let pages = self.query(None).await?;
        let records: Vec<Record> = pages.iter().filter_map(page_to_record).collect();
        info!(
            "Completed fetching Notion database ({} rows, {} records)",
            pages.len(),
            records.len()
        );
        Ok(records)
    }

    /// Create a row, returning the new page id.
    pub async fn create(&self, record: &Record) -> Result<String, SyncError> {
        let body = json!({
            "parent": { "database_id": self.settings.database_id },
            "properties": properties(record),
        });
        let created: CreatedPage = self
            .send(self.http.post(self.url("pages")).json(&body))
            .await?
            .json()
            .await?;
        Ok(created.id)
    }

    pub async fn update(&self, id: &str, record: &Record) -> Result<(), SyncError> {
        let body = json!({ "properties": properties(record) });
        self.send(self.http.patch(self.url(&format!("pages/{}", id))).json(&body))
            .await?;
        Ok(())
    }

    /// Logical delete.
    pub async fn archive(&self, id: &str) -> Result<(), SyncError> {
        let body = json!({ "archived": true });
        self.send(self.http.patch(self.url(&format!("pages/{}", id))).json(&body))
            .await?;
        Ok(())
    }

    /// Whether any row has `property == value`. The property name doubles
    /// as the filter type, which holds for the `url` and `title` columns.
    pub async fn exists(&self, property: &str, value: &str) -> Result<bool, SyncError> {
        let url = self.url(&format!("databases/{}/query", self.settings.database_id));
        let mut filter = json!({ "property": property });
        filter[property.to_lowercase()] = json!({ "equals": value });
        let body = json!({ "filter": filter, "page_size": 1 });
        let page: QueryResponse = self.send(self.http.post(&url).json(&body)).await?.json().await?;
        Ok(!page.results.is_empty())
    }

    /// Archive every row, spaced by `delay`. Returns (archived, failed).
    pub async fn purge(&self, delay: std::time::Duration) -> Result<(usize, usize), SyncError> {
        let pages = self.query(None).await?;
        let ids: Vec<&str> = pages
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .collect();

        let (mut archived, mut failed) = (0, 0);
        for (i, id) in ids.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.archive(id).await {
                Ok(()) => {
                    info!("Removed from Notion: {}", id);
                    archived += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Failed to remove {} from Notion: {}", id, e);
                    failed += 1;
                }
            }
        }
        Ok((archived, failed))
    }
}

fn properties(record: &Record) -> Value {
    json!({
        "title": { "title": [{ "text": { "content": record.title } }] },
        "url": { "url": record.url },
        "time": { "rich_text": [{ "text": { "content": record.time.as_deref().unwrap_or("") } }] },
    })
}

/// Read a database row; rows with neither url nor title are dropped.
pub fn page_to_record(page: &Value) -> Option<Record> {
    let props = page.get("properties")?;
    let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or("").to_string();

    let url = text(props.pointer("/url/url"));
    let title = text(props.pointer("/title/title/0/text/content"));
    let time = text(props.pointer("/time/rich_text/0/text/content"));
    if url.is_empty() && title.is_empty() {
        return None;
    }

    Some(Record {
        url,
        title,
        time: Some(time).filter(|t| !t.is_empty()),
        id: page
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

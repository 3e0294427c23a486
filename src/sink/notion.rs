use async_trait::async_trait;

use super::Sink;
use crate::api::notion::NotionClient;
use crate::error::SyncError;
use crate::record::Record;

/// Notion database as a sink. Deletes archive the page named by `Record::id`.
pub struct NotionSink {
    client: NotionClient,
}

impl NotionSink {
    pub fn new(client: NotionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Sink for NotionSink {
    fn name(&self) -> &str {
        "Notion"
    }

    async fn create(&mut self, record: &Record) -> Result<(), SyncError> {
        self.client.create(record).await.map(|_| ())
    }

    async fn delete(&mut self, record: &Record) -> Result<(), SyncError> {
        match record.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => self.client.archive(id).await,
            None => Err(SyncError::MissingId {
                url: record.url.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::NotionSettings;
    use crate::reconcile::reconcile;
    use crate::sink::apply;

    #[tokio::test]
    async fn applies_delta_to_database() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "new" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/old-b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "old-b" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NotionClient::new(NotionSettings {
            key: "k".into(),
            database_id: "db".into(),
            base_url: format!("{}/v1", server.uri()),
            version: "2022-06-28".into(),
        });
        let old = vec![
            Record::new("https://a", "A").with_id("old-a"),
            Record::new("https://b", "B").with_id("old-b"),
            Record::new("https://c", "C"),
        ];
        let new = vec![Record::new("https://a", "A"), Record::new("https://d", "D")];
        let delta = reconcile(&old, &new);

        let mut sink = NotionSink::new(client);
        let report = apply(&mut sink, &delta.added, &delta.removed, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.skipped, 1);
    }
}

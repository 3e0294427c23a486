use serde::Deserialize;
use tracing::info;

use super::{collect_pages, http_client, Page};
use crate::error::{check_status, SyncError};
use crate::extract::Extraction;
use crate::record::Record;

const REMEDY: &str = "re-authenticate with the youtube.readonly scope";
const PAGE_SIZE: &str = "50";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Created,
    Saved,
}

impl PlaylistKind {
    pub fn label(self) -> &'static str {
        match self {
            PlaylistKind::Created => "created",
            PlaylistKind::Saved => "saved",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub published_at: Option<String>,
    pub kind: PlaylistKind,
}

impl Playlist {
    pub fn to_record(&self) -> Record {
        Record {
            url: format!("https://www.youtube.com/playlist?list={}", self.id),
            title: self.title.clone(),
            time: self.published_at.clone(),
            id: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<Item>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct Item {
    id: String,
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    published_at: Option<String>,
}

pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl YouTubeClient {
    pub fn new(base_url: &str, token: String) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// One listing, every page. `filter` is the selector query pair
    /// (`mine=true` or `channelId=...`).
    pub async fn list_playlists(
        &self,
        filter: (&str, &str),
        kind: PlaylistKind,
    ) -> Result<Vec<Playlist>, SyncError> {
        let url = format!("{}/playlists", self.base_url);
        collect_pages(|token| {
            let mut query = vec![("part", "snippet".to_string()), ("maxResults", PAGE_SIZE.to_string())];
            query.push((filter.0, filter.1.to_string()));
            if let Some(t) = token {
                query.push(("pageToken", t));
            }
            let req = self.http.get(&url).bearer_auth(&self.token).query(&query);
            async move {
                let resp = check_status("youtube", REMEDY, req.send().await?).await?;
                let body: ListResponse = resp.json().await?;
                let items = body
                    .items
                    .into_iter()
                    .map(|item| Playlist {
                        id: item.id,
                        title: item.snippet.title,
                        published_at: item.snippet.published_at,
                        kind,
                    })
                    .collect();
                Ok(Page {
                    items,
                    next: body.next_page_token,
                })
            }
        })
        .await
    }

    /// Created playlists plus, when a channel is configured, that channel's
    /// playlists. Each listing is its own source: one failing leaves the other.
    pub async fn all_playlists(&self, channel_id: Option<&str>) -> (Vec<Playlist>, Extraction) {
        let mut playlists = Vec::new();
        let mut ex = Extraction::default();

        let created = self.list_playlists(("mine", "true"), PlaylistKind::Created).await;
        absorb(&mut playlists, &mut ex, "created playlists", created);

        match channel_id {
            Some(channel) => {
                let saved = self
                    .list_playlists(("channelId", channel), PlaylistKind::Saved)
                    .await;
                absorb(&mut playlists, &mut ex, "saved playlists", saved);
            }
            None => info!("YOUTUBE_CHANNEL_ID not set, skipping saved playlists"),
        }

        (playlists, ex)
    }
}

fn absorb(
    playlists: &mut Vec<Playlist>,
    ex: &mut Extraction,
    source: &str,
    result: Result<Vec<Playlist>, SyncError>,
) {
    let records = result.map(|found| {
        info!("{} {}", found.len(), source);
        let records = found.iter().map(Playlist::to_record).collect();
        playlists.extend(found);
        records
    });
    ex.absorb(source, records);
}

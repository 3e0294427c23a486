use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::gmail::GmailClient;
use crate::api::google::load_access_token;
use crate::api::notion::NotionClient;
use crate::api::youtube::YouTubeClient;
use crate::config::Config;
use crate::extract::{bookmarks, Extraction};
use crate::poll::{poll_until, PollOutcome};
use crate::reconcile::{reconcile, reconcile_batched, Reconciliation};
use crate::record::{Record, UrlIndex};
use crate::sink::{self, NotionSink, SinkReport, SnapshotSink};
use crate::{download, snapshot};

const SAMPLE: usize = 5;

pub fn reconcile_with(old: &[Record], new: &[Record], batches: Option<usize>) -> Reconciliation {
    let result = match batches {
        Some(n) if n > 1 => reconcile_batched(old, new, n),
        _ => reconcile(old, new),
    };
    result.log_summary();
    result
}

/// Reconcile `new` against the snapshot at `path` and persist the result.
pub async fn sync_snapshot(
    path: &Path,
    new: &[Record],
    batches: Option<usize>,
) -> Result<(Reconciliation, SinkReport)> {
    let old = snapshot::load(path).with_context(|| format!("loading {}", path.display()))?;
    let delta = reconcile_with(&old, new, batches);
    let mut sink = SnapshotSink::seeded(path, delta.unchanged.clone());
    let report = sink::apply(&mut sink, &delta.added, &delta.removed, Duration::ZERO).await?;
    Ok((delta, report))
}

fn fail_on_fatal(ex: &Extraction) -> Result<()> {
    if let Some(f) = ex.fatal() {
        bail!("{}", f);
    }
    Ok(())
}

fn print_delta(delta: &Reconciliation) {
    if delta.is_noop() {
        println!("Already up to date ({} items)", delta.unchanged.len());
        return;
    }
    println!(
        "Added: {}, Removed: {}, Unchanged: {}",
        delta.added.len(),
        delta.removed.len(),
        delta.unchanged.len()
    );
    for r in delta.added.iter().take(SAMPLE) {
        println!("  + {} ({})", shorten(&r.title, 60), r.url);
    }
    for r in delta.removed.iter().take(SAMPLE) {
        println!("  - {} ({})", shorten(&r.title, 60), r.url);
    }
}

// ── Bookmarks → JSON snapshot ──

pub async fn sync_bookmarks(
    dir: &Path,
    pattern: &str,
    snapshot_path: &Path,
    batches: Option<usize>,
) -> Result<()> {
    let ex = bookmarks::extract_dir(dir, pattern);
    if !ex.failures.is_empty() {
        for f in &ex.failures {
            error!("Source failed: {}", f);
        }
        bail!(
            "{} bookmark source(s) failed, snapshot {} left untouched",
            ex.failures.len(),
            snapshot_path.display()
        );
    }
    let (delta, report) = sync_snapshot(snapshot_path, &ex.records, batches).await?;
    print_delta(&delta);
    println!(
        "Snapshot {}: {} items ({} writes failed)",
        snapshot_path.display(),
        delta.updated_list().len(),
        report.failures()
    );
    Ok(())
}

// ── Notion ──

pub struct NotionSyncArgs<'a> {
    pub dir: &'a Path,
    pub pattern: &'a str,
    pub dump: Option<&'a Path>,
    pub refresh_metadata: bool,
    pub batches: Option<usize>,
}

pub async fn notion_sync(cfg: &Config, args: NotionSyncArgs<'_>) -> Result<()> {
    let client = NotionClient::new(cfg.notion()?);

    // Without the current rows every bookmark would look new, so this must succeed.
    let old = client
        .fetch_records()
        .await
        .context("fetching Notion database")?;

    let ex = bookmarks::extract_dir(args.dir, args.pattern);
    if let Some(dump) = args.dump {
        snapshot::save(dump, &ex.records)?;
    }
    if ex.records.is_empty() && !ex.failures.is_empty() {
        bail!("no bookmarks could be read from {}", args.dir.display());
    }

    let delta = reconcile_with(&old, &ex.records, args.batches);
    // rows from an unreadable export would look removed
    let removed: &[Record] = if ex.failures.is_empty() {
        &delta.removed
    } else {
        warn!(
            "{} export(s) failed, not archiving {} row(s)",
            ex.failures.len(),
            delta.removed.len()
        );
        &[]
    };
    let mut sink = NotionSink::new(client.clone());
    let report = sink::apply(&mut sink, &delta.added, removed, cfg.request_delay).await?;

    let refreshed = if args.refresh_metadata {
        refresh_metadata(&client, &old, &delta.unchanged, cfg.request_delay).await?
    } else {
        0
    };

    print_delta(&delta);
    println!(
        "Notion: {} created, {} archived, {} refreshed, {} skipped, {} failed",
        report.created,
        report.deleted,
        refreshed,
        report.skipped,
        report.failures()
    );
    Ok(())
}

/// Push newer title/time onto existing rows. Returns how many were updated.
async fn refresh_metadata(
    client: &NotionClient,
    old: &[Record],
    unchanged: &[Record],
    delay: Duration,
) -> Result<usize> {
    let old_idx = UrlIndex::build(old);
    let mut updated = 0;
    for record in unchanged {
        let Some(prev) = old_idx.get(&record.url) else {
            continue;
        };
        let Some(id) = prev.id.as_deref() else {
            continue;
        };
        if !prev.metadata_differs(record) {
            continue;
        }
        if updated > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match client.update(id, record).await {
            Ok(()) => {
                info!("Updated in Notion: {}", record.title);
                updated += 1;
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => error!("Failed to update {}: {}", record.url, e),
        }
    }
    Ok(updated)
}

pub async fn notion_purge(cfg: &Config) -> Result<()> {
    let client = NotionClient::new(cfg.notion()?);
    let (archived, failed) = client.purge(cfg.request_delay).await?;
    println!("Archived {} rows ({} failed)", archived, failed);
    Ok(())
}

pub async fn notion_exists(cfg: &Config, property: &str, value: &str) -> Result<bool> {
    let client = NotionClient::new(cfg.notion()?);
    let found = client.exists(property, value).await?;
    if found {
        println!("Item exists with {} = {}", property, value);
    } else {
        println!("Item does not exist with {} = {}", property, value);
    }
    Ok(found)
}

// ── YouTube ──

pub async fn playlists(
    cfg: &Config,
    snapshot_path: Option<&Path>,
    batches: Option<usize>,
) -> Result<()> {
    let token = load_access_token(&cfg.google_token_path, "youtube")?;
    let yt = YouTubeClient::new(&cfg.youtube_base_url, token);
    let (found, ex) = yt.all_playlists(cfg.youtube_channel_id.as_deref()).await;
    fail_on_fatal(&ex)?;

    if found.is_empty() {
        println!("No playlists found.");
    } else {
        println!("{} playlists:", found.len());
        for p in &found {
            println!("  - {} (ID: {}, Type: {})", shorten(&p.title, 50), p.id, p.kind.label());
        }
    }

    if let Some(path) = snapshot_path {
        if !ex.failures.is_empty() {
            bail!("{} playlist source(s) failed, snapshot left untouched", ex.failures.len());
        }
        let (delta, _) = sync_snapshot(path, &ex.records, batches).await?;
        print_delta(&delta);
    }
    Ok(())
}

// ── Gmail ──

fn gmail_client(cfg: &Config) -> Result<GmailClient> {
    let token = load_access_token(&cfg.google_token_path, "gmail")?;
    Ok(GmailClient::new(&cfg.gmail_base_url, token))
}

pub async fn mail_list(
    cfg: &Config,
    sender: &str,
    snapshot_path: Option<&Path>,
    batches: Option<usize>,
) -> Result<()> {
    let gmail = gmail_client(cfg)?;
    let mut ex = Extraction::default();
    let found = gmail.message_records(&format!("from:{}", sender)).await;
    ex.absorb(format!("mail from {}", sender), found);
    fail_on_fatal(&ex)?;

    for r in ex.records.iter().take(SAMPLE * 4) {
        println!("  {} | {}", r.time.as_deref().unwrap_or("-"), shorten(&r.title, 70));
    }
    println!("{} messages from {}", ex.records.len(), sender);

    if let Some(path) = snapshot_path {
        if !ex.failures.is_empty() {
            bail!("mail listing failed, snapshot left untouched");
        }
        let (delta, _) = sync_snapshot(path, &ex.records, batches).await?;
        print_delta(&delta);
    }
    Ok(())
}

/// Poll until a message from `sender` has attachments, save them, stop.
pub async fn mail_watch(
    cfg: &Config,
    sender: &str,
    download_dir: &Path,
    interval: Duration,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let gmail = gmail_client(cfg)?;
    std::fs::create_dir_all(download_dir)
        .with_context(|| format!("creating {}", download_dir.display()))?;

    let gmail = &gmail;
    let outcome = poll_until(interval, cancel, move || async move {
        let saved = gmail.fetch_attachments_from(sender, download_dir).await?;
        Ok(Some(saved).filter(|s: &Vec<PathBuf>| !s.is_empty()))
    })
    .await?;

    match outcome {
        PollOutcome::Done(saved) => {
            info!("Attachment download complete");
            for p in &saved {
                println!("Saved {}", p.display());
            }
        }
        PollOutcome::Cancelled => println!("Cancelled before any attachment arrived."),
    }
    Ok(())
}

// ── Download ──

pub async fn download_url(url: &str, dir: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let path = download::download(&client, url, dir).await?;
    println!("Saved {}", path.display());
    Ok(())
}

/// First `max` characters of `s`, with "..." when something was cut.
fn shorten(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &s[..cut])),
        None => Cow::Borrowed(s),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn shorten_counts_chars() {
        assert_eq!(shorten("한국어 노트", 3), "한국어...");
        assert_eq!(shorten("short", 10), "short");
        assert_eq!(shorten("exact", 5), "exact");
    }

    #[test]
    fn batched_choice_matches_sequential() {
        let old = vec![Record::new("a", "A"), Record::new("b", "B")];
        let new = vec![Record::new("b", "B"), Record::new("c", "C")];
        assert_eq!(reconcile_with(&old, &new, Some(4)), reconcile_with(&old, &new, None));
    }

    #[tokio::test]
    async fn bookmarks_round_trip_through_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let exports = dir.path().join("bookmarks");
        std::fs::create_dir_all(&exports).unwrap();
        std::fs::copy("tests/fixtures/bookmarks-2024.html", exports.join("bookmarks-2024.html")).unwrap();
        let snap = dir.path().join("output_links.json");
        snapshot::save(&snap, &[Record::new("https://gone.example", "Gone")]).unwrap();

        sync_bookmarks(&exports, "bookmarks-*.html", &snap, Some(2)).await.unwrap();
        let saved = snapshot::load(&snap).unwrap();
        assert_eq!(saved.len(), 3);
        assert!(saved.iter().all(|r| r.url != "https://gone.example"));

        // second run changes nothing
        let ex = bookmarks::extract_dir(&exports, "bookmarks-*.html");
        let (delta, _) = sync_snapshot(&snap, &ex.records, None).await.unwrap();
        assert!(delta.is_noop());
    }

    #[tokio::test]
    async fn missing_export_dir_leaves_snapshot_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let snap = dir.path().join("output_links.json");
        let seeded = vec![Record::new("https://a", "A"), Record::new("https://b", "B")];
        snapshot::save(&snap, &seeded).unwrap();

        let missing = dir.path().join("no-such-dir");
        let result = sync_bookmarks(&missing, "bookmarks-*.html", &snap, None).await;
        assert!(result.is_err());
        assert_eq!(snapshot::load(&snap).unwrap(), seeded);
    }

    #[tokio::test]
    async fn unreadable_export_blocks_archiving() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "p-old",
                    "properties": {
                        "url": { "url": "https://medium.com/p/only-in-broken-export" },
                        "title": { "title": [{ "text": { "content": "Old" } }] },
                    }
                }],
                "has_more": false,
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p-new" })))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::copy("tests/fixtures/bookmarks-2024.html", dir.path().join("bookmarks-2024.html")).unwrap();
        std::fs::write(dir.path().join("bookmarks-2023.html"), [0xff, 0xfe, 0x00]).unwrap();

        let base = format!("{}/v1", server.uri());
        let cfg = Config::from_lookup(|k| match k {
            "NOTION_KEY" => Some("k".into()),
            "NOTION_DATABASE_ID" => Some("db".into()),
            "NOTION_API_BASE" => Some(base.clone()),
            "SYNC_REQUEST_DELAY_MS" => Some("0".into()),
            _ => None,
        });
        let args = NotionSyncArgs {
            dir: dir.path(),
            pattern: "bookmarks-*.html",
            dump: None,
            refresh_metadata: false,
            batches: None,
        };
        notion_sync(&cfg, args).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_only_touches_changed_rows() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/p1"))
            .and(body_partial_json(json!({ "properties": { "title": { "title": [{ "text": { "content": "A new" } }] } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NotionClient::new(crate::config::NotionSettings {
            key: "k".into(),
            database_id: "db".into(),
            base_url: format!("{}/v1", server.uri()),
            version: "2022-06-28".into(),
        });
        let old = vec![
            Record::new("a", "A").with_id("p1"),
            Record::new("b", "B").with_id("p2"),
        ];
        let unchanged = vec![Record::new("a", "A new"), Record::new("b", "B")];
        let n = refresh_metadata(&client, &old, &unchanged, Duration::ZERO).await.unwrap();
        assert_eq!(n, 1);
    }
}

pub mod notion;
pub mod snapshot;

use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::record::Record;

pub use notion::NotionSink;
pub use snapshot::SnapshotSink;

/// A persistent store mirroring the latest collection. Each call is one
/// atomic single-record change.
#[async_trait]
pub trait Sink: Send {
    fn name(&self) -> &str;

    async fn create(&mut self, record: &Record) -> Result<(), SyncError>;

    async fn delete(&mut self, record: &Record) -> Result<(), SyncError>;

    async fn flush(&mut self) -> Result<(), SyncError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub created: usize,
    pub create_failed: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    pub skipped: usize,
}

impl SinkReport {
    pub fn failures(&self) -> usize {
        self.create_failed + self.delete_failed
    }
}

/// Create `added`, delete `removed`. Consecutive mutating calls are spaced
/// by `spacing`. A failed record is logged and counted; only an auth
/// failure stops the run.
pub async fn apply<S: Sink + ?Sized>(
    sink: &mut S,
    added: &[Record],
    removed: &[Record],
    spacing: Duration,
) -> Result<SinkReport, SyncError> {
    let mut report = SinkReport::default();
    let pb = progress_bar((added.len() + removed.len()) as u64);
    let mut issued = 0usize;

    for record in added {
        pace(&mut issued, spacing).await;
        match sink.create(record).await {
            Ok(()) => {
                info!("Added to {}: {}", sink.name(), record.title);
                report.created += 1;
            }
            Err(e) if e.is_fatal() => {
                pb.abandon();
                return Err(e);
            }
            Err(e) => {
                error!("Failed to add {} to {}: {}", record.url, sink.name(), e);
                report.create_failed += 1;
            }
        }
        pb.inc(1);
    }

    for record in removed {
        pace(&mut issued, spacing).await;
        match sink.delete(record).await {
            Ok(()) => {
                info!("Removed from {}: {}", sink.name(), record.url);
                report.deleted += 1;
            }
            Err(SyncError::MissingId { url }) => {
                warn!("Skipping delete of {}: no {} id", url, sink.name());
                report.skipped += 1;
            }
            Err(e) if e.is_fatal() => {
                pb.abandon();
                return Err(e);
            }
            Err(e) => {
                error!("Failed to remove {} from {}: {}", record.url, sink.name(), e);
                report.delete_failed += 1;
            }
        }
        pb.inc(1);
    }

    sink.flush().await?;
    pb.finish_and_clear();

    info!(
        created = report.created,
        deleted = report.deleted,
        skipped = report.skipped,
        failed = report.failures(),
        "{} update complete",
        sink.name()
    );
    Ok(report)
}

async fn pace(issued: &mut usize, spacing: Duration) {
    if *issued > 0 && !spacing.is_zero() {
        tokio::time::sleep(spacing).await;
    }
    *issued += 1;
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// In-memory sink that fails on chosen urls.
    #[derive(Default)]
    struct MemorySink {
        rows: Vec<Record>,
        fail_on: HashSet<String>,
        auth_broken: bool,
        calls: usize,
    }

    #[async_trait]
    impl Sink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        async fn create(&mut self, record: &Record) -> Result<(), SyncError> {
            self.calls += 1;
            if self.auth_broken {
                return Err(SyncError::Auth {
                    service: "memory",
                    remedy: "log in".into(),
                });
            }
            if self.fail_on.contains(&record.url) {
                return Err(SyncError::Http {
                    status: 429,
                    body: "slow down".into(),
                });
            }
            self.rows.push(record.clone());
            Ok(())
        }

        async fn delete(&mut self, record: &Record) -> Result<(), SyncError> {
            let id = record.id.as_deref().ok_or_else(|| SyncError::MissingId {
                url: record.url.clone(),
            })?;
            self.calls += 1;
            self.rows.retain(|r| r.id.as_deref() != Some(id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let mut sink = MemorySink {
            fail_on: HashSet::from(["b".to_string()]),
            ..Default::default()
        };
        let added = vec![Record::new("a", "A"), Record::new("b", "B"), Record::new("c", "C")];
        let report = apply(&mut sink, &added, &[], Duration::ZERO).await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.create_failed, 1);
        assert_eq!(sink.rows.len(), 2);
    }

    #[tokio::test]
    async fn deletes_without_id_are_skipped() {
        let mut sink = MemorySink {
            rows: vec![Record::new("x", "X").with_id("p1")],
            ..Default::default()
        };
        let removed = vec![Record::new("x", "X").with_id("p1"), Record::new("y", "Y")];
        let report = apply(&mut sink, &[], &removed, Duration::ZERO).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.skipped, 1);
        assert!(sink.rows.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_aborts() {
        let mut sink = MemorySink {
            auth_broken: true,
            ..Default::default()
        };
        let added = vec![Record::new("a", "A"), Record::new("b", "B")];
        let err = apply(&mut sink, &added, &[], Duration::ZERO).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(sink.calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mutating_calls_are_spaced() {
        let mut sink = MemorySink::default();
        let added = vec![Record::new("a", "A"), Record::new("b", "B"), Record::new("c", "C")];
        let start = tokio::time::Instant::now();
        apply(&mut sink, &added, &[], Duration::from_millis(200)).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "{:?}", elapsed);
    }
}

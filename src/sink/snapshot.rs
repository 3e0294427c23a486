use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::Sink;
use crate::error::SyncError;
use crate::record::Record;
use crate::snapshot;

/// Local JSON snapshot as a sink. Changes are kept in memory, keyed by url,
/// and written in one atomic replace on flush.
pub struct SnapshotSink {
    path: PathBuf,
    // deleted rows leave a `None` slot so positions stay valid
    slots: Vec<Option<Record>>,
    by_url: HashMap<String, usize>,
}

impl SnapshotSink {
    /// Start from `base`, normally the unchanged records carrying the newer metadata.
    pub fn seeded(path: impl Into<PathBuf>, base: Vec<Record>) -> Self {
        let mut sink = Self {
            path: path.into(),
            slots: Vec::with_capacity(base.len()),
            by_url: HashMap::with_capacity(base.len()),
        };
        for record in base {
            sink.upsert(record);
        }
        sink
    }

    fn upsert(&mut self, record: Record) {
        match self.by_url.get(&record.url) {
            Some(&i) => self.slots[i] = Some(record),
            None => {
                self.by_url.insert(record.url.clone(), self.slots.len());
                self.slots.push(Some(record));
            }
        }
    }

    fn current(&self) -> Vec<Record> {
        self.slots.iter().flatten().cloned().collect()
    }

    #[cfg(test)]
    pub fn records(&self) -> Vec<Record> {
        self.current()
    }
}

#[async_trait]
impl Sink for SnapshotSink {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn create(&mut self, record: &Record) -> Result<(), SyncError> {
        self.upsert(record.clone());
        Ok(())
    }

    async fn delete(&mut self, record: &Record) -> Result<(), SyncError> {
        if let Some(i) = self.by_url.remove(&record.url) {
            self.slots[i] = None;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SyncError> {
        snapshot::save(&self.path, &self.current())
    }
}

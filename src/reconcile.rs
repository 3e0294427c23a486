use rayon::prelude::*;
use tracing::{info, warn};

use crate::record::{Record, UrlIndex};

/// Partition of `new` against `old`, keyed by url.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: Vec<Record>,
    pub removed: Vec<Record>,
    pub unchanged: Vec<Record>,
}

impl Reconciliation {
    /// State to persist: unchanged (with the newer metadata) followed by added.
    pub fn updated_list(&self) -> Vec<Record> {
        self.unchanged
            .iter()
            .chain(self.added.iter())
            .cloned()
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn log_summary(&self) {
        info!(
            added = self.added.len(),
            removed = self.removed.len(),
            unchanged = self.unchanged.len(),
            "Comparison complete"
        );
    }
}

/// Sequential reconciliation in O(|old| + |new|).
pub fn reconcile(old: &[Record], new: &[Record]) -> Reconciliation {
    warn_unkeyed(new);
    let old_idx = UrlIndex::build(old);
    let new_idx = UrlIndex::build(new);

    let (added, unchanged) = classify(&new_idx.records, &old_idx);
    let mut removed = missing_from(&old_idx.records, &new_idx);
    removed.extend(unkeyed(old));

    Reconciliation {
        added,
        removed,
        unchanged,
    }
}

/// Same result as [`reconcile`], with both sides split into `batches` chunks
/// checked in parallel against read-only indexes. Chunk results are joined
/// in order once every worker is done.
pub fn reconcile_batched(old: &[Record], new: &[Record], batches: usize) -> Reconciliation {
    warn_unkeyed(new);
    let batches = batches.max(1);
    let old_idx = UrlIndex::build(old);
    let new_idx = UrlIndex::build(new);

    let new_chunk = new_idx.len() / batches + 1;
    let partials: Vec<(Vec<Record>, Vec<Record>)> = new_idx
        .records
        .par_chunks(new_chunk)
        .map(|chunk| classify(chunk, &old_idx))
        .collect();

    let old_chunk = old_idx.len() / batches + 1;
    let removed_parts: Vec<Vec<Record>> = old_idx
        .records
        .par_chunks(old_chunk)
        .map(|chunk| missing_from(chunk, &new_idx))
        .collect();

    let mut result = Reconciliation::default();
    for (added, unchanged) in partials {
        result.added.extend(added);
        result.unchanged.extend(unchanged);
    }
    result.removed = removed_parts.into_iter().flatten().collect();
    result.removed.extend(unkeyed(old));
    result
}

/// Split new entries into (added, unchanged).
fn classify(chunk: &[&Record], old: &UrlIndex) -> (Vec<Record>, Vec<Record>) {
    let mut added = Vec::new();
    let mut unchanged = Vec::new();
    for &r in chunk {
        if old.contains(&r.url) {
            unchanged.push(r.clone());
        } else {
            added.push(r.clone());
        }
    }
    (added, unchanged)
}

fn missing_from(chunk: &[&Record], new: &UrlIndex) -> Vec<Record> {
    chunk
        .iter()
        .filter(|r| !new.contains(&r.url))
        .map(|&r| r.clone())
        .collect()
}

// Old rows without a url never match; each is reported as removed.
fn unkeyed(old: &[Record]) -> impl Iterator<Item = Record> + '_ {
    old.iter().filter(|r| !r.has_key()).cloned()
}

fn warn_unkeyed(new: &[Record]) {
    let n = new.iter().filter(|r| !r.has_key()).count();
    if n > 0 {
        warn!("Dropping {} new record(s) without a url", n);
    }
}

pub mod bookmarks;

use std::fmt;

use tracing::warn;

use crate::error::SyncError;
use crate::record::Record;

/// A source that produced nothing because reading it failed.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub reason: SyncError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Records gathered from several sources plus the sources that failed.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub failures: Vec<SourceFailure>,
}

impl Extraction {
    /// Fold one source's result in; a failure contributes zero records.
    pub fn absorb(&mut self, source: impl Into<String>, result: Result<Vec<Record>, SyncError>) {
        let source = source.into();
        match result {
            Ok(records) => self.records.extend(records),
            Err(reason) => {
                warn!("Skipping {}: {}", source, reason);
                self.failures.push(SourceFailure { source, reason });
            }
        }
    }

    /// First fatal failure, if any source hit one.
    pub fn fatal(&self) -> Option<&SourceFailure> {
        self.failures.iter().find(|f| f.reason.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_contributes_nothing() {
        let mut ex = Extraction::default();
        ex.absorb("one", Ok(vec![Record::new("a", "A")]));
        ex.absorb(
            "two",
            Err(SyncError::Http {
                status: 500,
                body: "boom".into(),
            }),
        );
        ex.absorb("three", Ok(vec![Record::new("b", "B")]));
        assert_eq!(ex.records.len(), 2);
        assert_eq!(ex.failures.len(), 1);
        assert_eq!(ex.failures[0].source, "two");
        assert!(ex.fatal().is_none());
    }

    #[test]
    fn auth_failure_is_reported_as_fatal() {
        let mut ex = Extraction::default();
        ex.absorb(
            "playlists",
            Err(SyncError::Auth {
                service: "youtube",
                remedy: "re-authenticate".into(),
            }),
        );
        assert!(ex.fatal().is_some());
    }
}

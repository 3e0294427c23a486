use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One bookmark / playlist / message / database row, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Record {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            time: None,
            id: None,
        }
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    #[cfg(test)]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// A record without a url cannot be matched against anything.
    pub fn has_key(&self) -> bool {
        !self.url.is_empty()
    }

    /// True when title or time differ (url and id are ignored).
    pub fn metadata_differs(&self, other: &Record) -> bool {
        self.title != other.title || self.time != other.time
    }
}

/// Url-keyed view of a collection: first-seen key order, last value wins.
pub struct UrlIndex<'a> {
    pub records: Vec<&'a Record>,
    positions: HashMap<&'a str, usize>,
}

impl<'a> UrlIndex<'a> {
    /// Records without a url are left out.
    pub fn build(records: &'a [Record]) -> Self {
        let mut ordered: Vec<&Record> = Vec::with_capacity(records.len());
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(records.len());
        for r in records.iter().filter(|r| r.has_key()) {
            match positions.get(r.url.as_str()) {
                Some(&i) => ordered[i] = r,
                None => {
                    positions.insert(r.url.as_str(), ordered.len());
                    ordered.push(r);
                }
            }
        }
        Self {
            records: ordered,
            positions,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.positions.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&'a Record> {
        self.positions.get(url).map(|&i| self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

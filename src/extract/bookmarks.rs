use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::Extraction;
use crate::error::SyncError;
use crate::record::Record;

static ITEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body > section > ul > li").unwrap());

/// Parse one bookmark export. Anything outside `body > section > ul > li`
/// is ignored; a document without that structure yields no records.
pub fn parse_bookmarks_html(html: &str) -> Vec<Record> {
    let doc = Html::parse_document(html);
    doc.select(&ITEM_SEL).filter_map(parse_item).collect()
}

fn parse_item(li: ElementRef) -> Option<Record> {
    let link = child_with_class(li, "a", "h-cite")?;
    let url = link.value().attr("href").map(str::trim).unwrap_or("");
    let title = text_of(link);
    if url.is_empty() || title.is_empty() {
        return None;
    }

    let time = child_with_class(li, "time", "dt-published")
        .map(text_of)
        .filter(|t| !t.is_empty());

    let record = Record::new(url, title);
    Some(match time {
        Some(t) => record.with_time(t),
        None => record,
    })
}

// `class` must be the whole attribute value, not one class among several.
fn child_with_class<'a>(parent: ElementRef<'a>, tag: &str, class: &str) -> Option<ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == tag && el.value().attr("class") == Some(class))
}

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Read and parse a single export file.
pub fn extract_file(path: &Path) -> Result<Vec<Record>, SyncError> {
    let html = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    Ok(parse_bookmarks_html(&html))
}

/// Files in `dir` matching the glob `pattern`, sorted by name.
pub fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, SyncError> {
    // glob yields nothing for a missing directory; report it instead
    std::fs::metadata(dir).map_err(|e| SyncError::io(dir, e))?;
    let dir_str = dir
        .to_str()
        .ok_or_else(|| SyncError::Decode(format!("non UTF-8 path {}", dir.display())))?;
    let full = format!("{}/{}", glob::Pattern::escape(dir_str), pattern);

    let paths = glob::glob(&full)
        .map_err(|e| SyncError::Decode(format!("pattern {:?}: {}", pattern, e)))?;
    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {}", e.path().display(), e.error()),
        }
    }
    files.sort();
    Ok(files)
}

/// Extract every matching export in `dir`. A file that cannot be read is
/// recorded as a failure and the rest are still processed.
pub fn extract_dir(dir: &Path, pattern: &str) -> Extraction {
    let mut ex = Extraction::default();
    let files = match matching_files(dir, pattern) {
        Ok(files) => files,
        Err(e) => {
            ex.absorb(dir.display().to_string(), Err(e));
            return ex;
        }
    };

    for path in files {
        info!("Processing: {}", path.display());
        let result = extract_file(&path);
        if let Ok(records) = &result {
            debug!("{} links in {}", records.len(), path.display());
        }
        ex.absorb(path.display().to_string(), result);
    }

    info!("Loaded {} items from bookmarks", ex.records.len());
    ex
}

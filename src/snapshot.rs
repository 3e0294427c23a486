use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::error::SyncError;
use crate::record::Record;

/// Load the last persisted collection. A missing file is an empty collection.
pub fn load(path: &Path) -> Result<Vec<Record>, SyncError> {
    if !path.exists() {
        warn!("No existing snapshot at {}, starting empty", path.display());
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    let records: Vec<Record> = serde_json::from_str(&raw)?;
    info!("Loaded {} items from {}", records.len(), path.display());
    Ok(records)
}

/// Replace the snapshot atomically: write a sibling temp file, then rename.
pub fn save(path: &Path, records: &[Record]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| SyncError::io(&tmp, e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| SyncError::io(&tmp, e))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| SyncError::io(path, e))?;

    info!("Saved {} items to {}", records.len(), path.display());
    Ok(())
}

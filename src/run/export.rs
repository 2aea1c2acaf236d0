// src/run/export.rs
//! Backup and restore of run history as JSON

use super::{RunRecord, RunStore, SortOrder};
use crate::error::Result;
use std::path::Path;
use tracing::{debug, info};

/// Write every stored run to `path` as a JSON array. Returns the count.
pub fn export_runs(store: &dyn RunStore, path: &Path) -> Result<usize> {
    let runs = store.list(SortOrder::DateAscending)?;
    let contents = serde_json::to_string_pretty(&runs)?;
    std::fs::write(path, contents)?;
    info!(path = %path.display(), runs = runs.len(), "Runs exported");
    Ok(runs.len())
}

/// Import runs from a JSON array.
///
/// Records whose id already exists in the store are skipped; the rest are
/// inserted with new ids. Returns the number imported.
pub fn import_runs(store: &dyn RunStore, path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)?;
    let runs: Vec<RunRecord> = serde_json::from_str(&contents)?;

    let mut fresh = Vec::new();
    for run in runs {
        if let Some(id) = run.id {
            if store.get(id)?.is_some() {
                debug!(id, "Skipping run already in history");
                continue;
            }
        }
        fresh.push(RunRecord { id: None, ..run });
    }

    let imported = store.insert_many(fresh)?.len();
    info!(path = %path.display(), imported, "Runs imported");
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::run::store::tests::record;
    use crate::run::MemoryRunStore;

    #[test]
    fn test_export_then_import_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");

        let source = MemoryRunStore::new();
        source.insert(record(1, 5000.0, 1_800_000, 10.0)).unwrap();
        source.insert(record(2, 7000.0, 2_400_000, 10.5)).unwrap();
        assert_eq!(export_runs(&source, &path).unwrap(), 2);

        // same store: everything is already there
        assert_eq!(import_runs(&source, &path).unwrap(), 0);

        let target = MemoryRunStore::new();
        target.insert(record(9, 1000.0, 1, 1.0)).unwrap();
        // id 1 exists in target, id 2 does not
        assert_eq!(import_runs(&target, &path).unwrap(), 1);
        let runs = target.list(SortOrder::DateAscending).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].distance_m, 7000.0);
        assert_eq!(runs[0].id, Some(2));
    }

    #[test]
    fn test_import_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{").unwrap();
        let store = MemoryRunStore::new();
        assert!(matches!(import_runs(&store, &path), Err(TrackerError::Json(_))));
    }
}

// src/run/store.rs
//! Run history storage

use super::stats::{self, PersonalRecords, RunTotals};
use super::{RunId, RunRecord};
use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Orderings offered by run history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortOrder {
    /// Newest first
    #[default]
    Date,
    /// Oldest first
    #[value(name = "date-asc")]
    DateAscending,
    Distance,
    Duration,
    #[value(name = "speed")]
    AvgSpeed,
    Calories,
}

impl SortOrder {
    fn compare(self, a: &RunRecord, b: &RunRecord) -> Ordering {
        match self {
            SortOrder::Date => b.started_at.cmp(&a.started_at),
            SortOrder::DateAscending => a.started_at.cmp(&b.started_at),
            SortOrder::Distance => b.distance_m.total_cmp(&a.distance_m),
            SortOrder::Duration => b.duration_ms.cmp(&a.duration_ms),
            SortOrder::AvgSpeed => b.avg_speed_kmh.total_cmp(&a.avg_speed_kmh),
            SortOrder::Calories => b.calories.total_cmp(&a.calories),
        }
    }

    pub fn sort(self, runs: &mut [RunRecord]) {
        runs.sort_by(|a, b| self.compare(a, b).then_with(|| a.id.cmp(&b.id)));
    }
}

/// Durable store of finished runs
pub trait RunStore: Send + Sync {
    /// Store a record and return its newly assigned id
    fn insert(&self, record: RunRecord) -> Result<RunId>;

    /// Remove a run. Returns whether it existed.
    fn delete(&self, id: RunId) -> Result<bool>;

    fn get(&self, id: RunId) -> Result<Option<RunRecord>>;

    fn list(&self, order: SortOrder) -> Result<Vec<RunRecord>>;

    fn insert_many(&self, records: Vec<RunRecord>) -> Result<Vec<RunId>> {
        records.into_iter().map(|record| self.insert(record)).collect()
    }

    fn totals(&self) -> Result<RunTotals> {
        Ok(RunTotals::from_runs(&self.list(SortOrder::Date)?))
    }

    /// Fastest run covering at least `min_distance_m`
    fn best_time_for_distance(&self, min_distance_m: f64) -> Result<Option<RunRecord>> {
        Ok(stats::best_time_for_distance(&self.list(SortOrder::Date)?, min_distance_m).cloned())
    }

    fn personal_records(&self) -> Result<PersonalRecords> {
        Ok(PersonalRecords::from_runs(&self.list(SortOrder::Date)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    next_id: RunId,
    runs: Vec<RunRecord>,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            next_id: 1,
            runs: Vec::new(),
        }
    }
}

impl StoreData {
    fn insert(&mut self, mut record: RunRecord) -> RunId {
        let id = self.next_id;
        self.next_id += 1;
        record.id = Some(id);
        self.runs.push(record);
        id
    }

    fn delete(&mut self, id: RunId) -> bool {
        let before = self.runs.len();
        self.runs.retain(|run| run.id != Some(id));
        self.runs.len() != before
    }

    fn get(&self, id: RunId) -> Option<RunRecord> {
        self.runs.iter().find(|run| run.id == Some(id)).cloned()
    }

    fn list(&self, order: SortOrder) -> Vec<RunRecord> {
        let mut runs = self.runs.clone();
        order.sort(&mut runs);
        runs
    }
}

fn lock(data: &Mutex<StoreData>) -> Result<MutexGuard<'_, StoreData>> {
    data.lock()
        .map_err(|_| TrackerError::Store("run store lock poisoned".to_string()))
}

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    data: Mutex<StoreData>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn insert(&self, record: RunRecord) -> Result<RunId> {
        Ok(lock(&self.data)?.insert(record))
    }

    fn delete(&self, id: RunId) -> Result<bool> {
        Ok(lock(&self.data)?.delete(id))
    }

    fn get(&self, id: RunId) -> Result<Option<RunRecord>> {
        Ok(lock(&self.data)?.get(id))
    }

    fn list(&self, order: SortOrder) -> Result<Vec<RunRecord>> {
        Ok(lock(&self.data)?.list(order))
    }
}

/// Store persisted as a single JSON document, rewritten on every change
#[derive(Debug)]
pub struct JsonRunStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonRunStore {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| TrackerError::Store(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str(&contents)
                .map_err(|e| TrackerError::Store(format!("Failed to parse {}: {}", path.display(), e)))?
        } else {
            StoreData::default()
        };
        info!(path = %path.display(), runs = data.runs.len(), "Opened run store");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::Store(format!("Failed to create store directory: {}", e)))?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| TrackerError::Store(format!("Failed to write {}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), runs = data.runs.len(), "Run store written");
        Ok(())
    }
}

impl RunStore for JsonRunStore {
    fn insert(&self, record: RunRecord) -> Result<RunId> {
        let mut data = lock(&self.data)?;
        let mut updated = data.clone();
        let id = updated.insert(record);
        self.persist(&updated)?;
        *data = updated;
        Ok(id)
    }

    fn delete(&self, id: RunId) -> Result<bool> {
        let mut data = lock(&self.data)?;
        let mut updated = data.clone();
        if !updated.delete(id) {
            return Ok(false);
        }
        self.persist(&updated)?;
        *data = updated;
        info!(id, "Run deleted");
        Ok(true)
    }

    fn get(&self, id: RunId) -> Result<Option<RunRecord>> {
        Ok(lock(&self.data)?.get(id))
    }

    fn list(&self, order: SortOrder) -> Result<Vec<RunRecord>> {
        Ok(lock(&self.data)?.list(order))
    }

    fn insert_many(&self, records: Vec<RunRecord>) -> Result<Vec<RunId>> {
        let mut data = lock(&self.data)?;
        let mut updated = data.clone();
        let ids = records.into_iter().map(|record| updated.insert(record)).collect();
        self.persist(&updated)?;
        *data = updated;
        Ok(ids)
    }
}

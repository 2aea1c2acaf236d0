// src/run/mod.rs
//! Completed runs: finalization, storage, statistics and export

pub mod export;
pub mod finalizer;
pub mod route_export;
pub mod stats;
pub mod store;

pub use finalizer::RunFinalizer;
pub use store::{JsonRunStore, MemoryRunStore, RunStore, SortOrder};

use crate::tracking::RouteSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RunId = u64;

/// A finished run as kept in history. Never modified after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Assigned by the store on insert
    pub id: Option<RunId>,
    pub route: RouteSnapshot,
    pub started_at: DateTime<Utc>,
    pub avg_speed_kmh: f64,
    pub distance_m: f64,
    pub duration_ms: u64,
    pub calories: f64,
}

impl RunRecord {
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }
}

// src/run/finalizer.rs
//! Turns a stopped run into a stored record

use super::{RunRecord, RunStore};
use crate::error::{Result, TrackerError};
use crate::tracking::FinishedRun;
use std::sync::Arc;
use tracing::{error, info};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Average speed in km/h; zero when no time has elapsed
pub fn average_speed_kmh(distance_m: f64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    (distance_m / 1000.0) / (elapsed_ms as f64 / MILLIS_PER_HOUR)
}

/// Rough calorie estimate: one kcal per kilometre per kilogram of body weight
pub fn calories_burned(distance_m: f64, weight_kg: f64) -> f64 {
    (distance_m / 1000.0) * weight_kg
}

#[derive(Clone)]
pub struct RunFinalizer {
    store: Arc<dyn RunStore>,
    weight_kg: f64,
}

impl RunFinalizer {
    pub fn new(store: Arc<dyn RunStore>, weight_kg: f64) -> Self {
        Self { store, weight_kg }
    }

    pub fn weight_kg(&self) -> f64 {
        self.weight_kg
    }

    /// Compute summary metrics without storing anything.
    ///
    /// Runs without any fix still produce a record, with zero distance.
    pub fn summarize(&self, run: &FinishedRun) -> Result<RunRecord> {
        let distance_m = run.track.distance_meters();
        Ok(RunRecord {
            id: None,
            route: run.track.snapshot()?,
            started_at: run.started_at,
            avg_speed_kmh: average_speed_kmh(distance_m, run.elapsed_ms),
            distance_m,
            duration_ms: run.elapsed_ms,
            calories: calories_burned(distance_m, self.weight_kg),
        })
    }

    /// Summarize and insert. On a store failure the unsaved record is
    /// returned inside `SaveFailed`.
    pub fn finalize(&self, run: FinishedRun) -> Result<RunRecord> {
        let mut record = self.summarize(&run)?;

        match self.store.insert(record.clone()) {
            Ok(id) => {
                record.id = Some(id);
                info!(
                    id,
                    distance_m = record.distance_m,
                    duration_ms = record.duration_ms,
                    avg_speed_kmh = record.avg_speed_kmh,
                    "Run saved"
                );
                Ok(record)
            }
            Err(e) => {
                error!(error = %e, "Failed to save run");
                Err(TrackerError::SaveFailed {
                    record: Box::new(record),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LatLng;
    use crate::run::{MemoryRunStore, RunId, SortOrder};
    use crate::tracking::{RunSegment, RunTrack};
    use chrono::Utc;

    struct FailingStore;

    impl RunStore for FailingStore {
        fn insert(&self, _record: RunRecord) -> Result<RunId> {
            Err(TrackerError::Store("disk full".to_string()))
        }
        fn delete(&self, _id: RunId) -> Result<bool> {
            Ok(false)
        }
        fn get(&self, _id: RunId) -> Result<Option<RunRecord>> {
            Ok(None)
        }
        fn list(&self, _order: SortOrder) -> Result<Vec<RunRecord>> {
            Ok(Vec::new())
        }
    }

    /// 100 m east at the equator, in degrees of longitude
    const HUNDRED_M_DEG: f64 = 100.0 / 111_194.93;

    fn straight_line_run() -> FinishedRun {
        let points = (0..3)
            .map(|i| LatLng::new(0.0, i as f64 * HUNDRED_M_DEG))
            .collect();
        FinishedRun {
            track: RunTrack::from_segments(vec![RunSegment { points }]),
            elapsed_ms: 3000,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_average_speed_zero_elapsed() {
        assert_eq!(average_speed_kmh(0.0, 0), 0.0);
        assert_eq!(average_speed_kmh(5_000.0, 0), 0.0);
    }

    #[test]
    fn test_average_speed_and_calories() {
        assert!((average_speed_kmh(10_000.0, 3_600_000) - 10.0).abs() < 1e-9);
        assert!((calories_burned(5_000.0, 70.0) - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_straight_line_scenario_arithmetic() {
        let store = Arc::new(MemoryRunStore::new());
        let finalizer = RunFinalizer::new(store.clone(), 80.0);

        let record = finalizer.finalize(straight_line_run()).unwrap();

        assert!((record.distance_m - 200.0).abs() < 0.5, "distance {}", record.distance_m);
        assert!((record.avg_speed_kmh - 240.0).abs() < 0.6, "speed {}", record.avg_speed_kmh);
        assert!((record.calories - 16.0).abs() < 0.05);
        assert_eq!(record.duration_ms, 3000);
        assert_eq!(record.route.segments.len(), 1);
        assert_eq!(record.id, Some(1));
        assert_eq!(store.list(SortOrder::Date).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_fix_run_is_saved_with_zero_metrics() {
        let store = Arc::new(MemoryRunStore::new());
        let finalizer = RunFinalizer::new(store.clone(), 80.0);
        let mut track = RunTrack::new();
        track.begin_segment();
        track.seal();

        let record = finalizer
            .finalize(FinishedRun {
                track,
                elapsed_ms: 0,
                started_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(record.distance_m, 0.0);
        assert_eq!(record.avg_speed_kmh, 0.0);
        assert_eq!(record.calories, 0.0);
        assert!(record.id.is_some());
    }

    #[test]
    fn test_store_failure_returns_record() {
        let finalizer = RunFinalizer::new(Arc::new(FailingStore), 80.0);
        match finalizer.finalize(straight_line_run()) {
            Err(TrackerError::SaveFailed { record, reason }) => {
                assert!(reason.contains("disk full"));
                assert!(record.id.is_none());
                assert!(record.distance_m > 199.0);
            }
            other => panic!("expected SaveFailed, got {:?}", other),
        }
    }
}

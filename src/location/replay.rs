// src/location/replay.rs
//! Replays a recorded list of positions as a live feed

use super::{Fix, FixSink, LatLng, LocationRequest, LocationSource, UpdateTask};
use crate::error::{Result, TrackerError};
use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Emits one recorded position per request interval. Pausing keeps the
/// cursor, so a resumed run continues where the replay left off.
pub struct ReplaySource {
    points: Arc<Vec<LatLng>>,
    cursor: Arc<AtomicUsize>,
    task: UpdateTask,
}

impl ReplaySource {
    pub fn new(points: Vec<LatLng>) -> Self {
        Self {
            points: Arc::new(points),
            cursor: Arc::new(AtomicUsize::new(0)),
            task: UpdateTask::default(),
        }
    }

    /// Load a JSON array of `{"latitude": .., "longitude": ..}` objects
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let points: Vec<LatLng> = serde_json::from_str(&contents)?;
        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            return Err(TrackerError::Parse(format!(
                "Invalid coordinate in replay file: {}, {}",
                bad.latitude, bad.longitude
            )));
        }
        Ok(Self::new(points))
    }

    pub fn remaining(&self) -> usize {
        self.points.len().saturating_sub(self.cursor.load(Ordering::Relaxed))
    }
}

impl LocationSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn has_permission(&self) -> bool {
        true
    }

    fn start_updates(&mut self, request: &LocationRequest, sink: FixSink) {
        let points = Arc::clone(&self.points);
        let cursor = Arc::clone(&self.cursor);
        let period = request.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let idx = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(point) = points.get(idx) else {
                    info!("Replay finished");
                    break;
                };
                if !sink.deliver(vec![Fix::now(point.latitude, point.longitude)]) {
                    break;
                }
            }
        });
        self.task.replace(handle);
    }

    fn stop_updates(&mut self) {
        self.task.stop();
    }
}

// src/run/stats.rs
//! Aggregate statistics over run history

use super::RunRecord;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

pub const FIVE_K_METERS: f64 = 5_000.0;
pub const TEN_K_METERS: f64 = 10_000.0;
pub const HALF_MARATHON_METERS: f64 = 21_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub runs: usize,
    pub distance_m: f64,
    pub duration_ms: u64,
    pub calories: f64,
    /// Mean of the per-run average speeds
    pub avg_speed_kmh: f64,
}

impl RunTotals {
    pub fn from_runs(runs: &[RunRecord]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }
        Self {
            runs: runs.len(),
            distance_m: runs.iter().map(|r| r.distance_m).sum(),
            duration_ms: runs.iter().map(|r| r.duration_ms).sum(),
            calories: runs.iter().map(|r| r.calories).sum(),
            avg_speed_kmh: runs.iter().map(|r| r.avg_speed_kmh).sum::<f64>() / runs.len() as f64,
        }
    }
}

/// Shortest duration among runs at least `min_distance_m` long
pub fn best_time_for_distance(runs: &[RunRecord], min_distance_m: f64) -> Option<&RunRecord> {
    runs.iter()
        .filter(|r| r.distance_m >= min_distance_m)
        .min_by(|a, b| a.duration_ms.cmp(&b.duration_ms).then_with(|| a.started_at.cmp(&b.started_at)))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonalRecords {
    pub five_k: Option<RunRecord>,
    pub ten_k: Option<RunRecord>,
    pub half_marathon: Option<RunRecord>,
}

impl PersonalRecords {
    pub fn from_runs(runs: &[RunRecord]) -> Self {
        Self {
            five_k: best_time_for_distance(runs, FIVE_K_METERS).cloned(),
            ten_k: best_time_for_distance(runs, TEN_K_METERS).cloned(),
            half_marathon: best_time_for_distance(runs, HALF_MARATHON_METERS).cloned(),
        }
    }
}

/// Convert a speed to pace; zero speed gives zero pace
pub fn kmh_to_min_per_km(speed_kmh: f64) -> f64 {
    if speed_kmh == 0.0 {
        return 0.0;
    }
    60.0 / speed_kmh
}

/// Kilometres run in the ISO week containing `day`
pub fn km_in_week_of(runs: &[RunRecord], day: NaiveDate) -> f64 {
    let week = day.iso_week();
    runs.iter()
        .filter(|r| r.started_at.date_naive().iso_week() == week)
        .map(|r| r.distance_m / 1000.0)
        .sum()
}

/// Kilometres this week and last week, relative to `today`
pub fn weekly_km(runs: &[RunRecord], today: NaiveDate) -> (f64, f64) {
    (
        km_in_week_of(runs, today),
        km_in_week_of(runs, today - Duration::days(7)),
    )
}

/// Stopwatch text, `HH:MM:SS` or `HH:MM:SS:cc` with hundredths
pub fn format_stopwatch(ms: u64, include_millis: bool) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1_000) % 60;
    if include_millis {
        let hundredths = (ms % 1_000) / 10;
        format!("{:02}:{:02}:{:02}:{:02}", hours, minutes, seconds, hundredths)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

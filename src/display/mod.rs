// src/display/mod.rs
//! Terminal output for live runs and run history

pub mod terminal;

pub use terminal::{DashboardAction, RunDashboard};

use crate::run::{stats, RunRecord};

/// One history row, as printed by `runs`
pub fn format_run_row(run: &RunRecord) -> String {
    format!(
        "{:>5}  {}  {:>8.2} km  {}  {:>6.1} km/h  {:>6.0} kcal",
        run.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
        run.started_at.format("%Y-%m-%d %H:%M"),
        run.distance_km(),
        stats::format_stopwatch(run.duration_ms, false),
        run.avg_speed_kmh,
        run.calories,
    )
}

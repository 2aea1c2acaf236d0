// src/lib.rs
//! Run Tracker Library
//!
//! Records outdoor runs from a GPS feed: a single-owner tracking service
//! handles start/pause/resume/stop, accumulates the route as segments and
//! keeps a stopwatch; finished runs are summarized and stored in a history
//! that feeds statistics and personal records.

pub mod config;
pub mod display;
pub mod error;
pub mod location;
pub mod logging;
pub mod run;
pub mod tracking;

// Re-export main types for convenience
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use location::{Fix, LatLng, LocationSource};
pub use run::{RunFinalizer, RunRecord, RunStore};
pub use tracking::{TrackingHandle, TrackingService, TrackingSnapshot, TrackingState};

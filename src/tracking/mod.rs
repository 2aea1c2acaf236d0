// src/tracking/mod.rs
//! Run tracking: lifecycle, elapsed time and route accumulation

pub mod clock;
pub mod machine;
pub mod service;
pub mod track;

pub use clock::{Clock, ManualClock, Stopwatch, SystemClock};
pub use machine::{Command, FinishedRun, RunTracker, TrackingSnapshot, TrackingState};
pub use service::{TrackingHandle, TrackingOptions, TrackingService};
pub use track::{RouteSnapshot, RunSegment, RunTrack};

// src/tracking/machine.rs
//! Run lifecycle state machine

use super::clock::Stopwatch;
use super::track::RunTrack;
use crate::error::{Result, TrackerError};
use crate::location::Fix;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackingState::Idle => "idle",
            TrackingState::Running => "running",
            TrackingState::Paused => "paused",
            TrackingState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Cancel,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

impl Command {
    /// Transition table
    pub fn is_valid_from(self, state: TrackingState) -> bool {
        use TrackingState::*;
        match self {
            Command::Start => state == Idle,
            Command::Pause => state == Running,
            Command::Resume => state == Paused,
            Command::Stop | Command::Cancel => matches!(state, Running | Paused),
        }
    }
}

/// Published view of a run in progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub state: TrackingState,
    pub is_tracking: bool,
    pub elapsed_ms: u64,
    pub track: RunTrack,
}

/// Everything the finalizer needs once a run stops
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRun {
    pub track: RunTrack,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Single-owner state of one run attempt.
///
/// Every segment gets an epoch; fixes are only accepted for the epoch of the
/// currently open segment, so a fix captured before a pause cannot leak into
/// the segment opened by the next resume.
#[derive(Debug, Clone)]
pub struct RunTracker {
    state: TrackingState,
    track: RunTrack,
    stopwatch: Stopwatch,
    elapsed_ms: u64,
    epoch: u64,
    started_at: Option<DateTime<Utc>>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            state: TrackingState::Idle,
            track: RunTrack::new(),
            stopwatch: Stopwatch::new(),
            elapsed_ms: 0,
            epoch: 0,
            started_at: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == TrackingState::Running
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn track(&self) -> &RunTrack {
        &self.track
    }

    /// Epoch of the currently open segment
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            state: self.state,
            is_tracking: self.is_tracking(),
            elapsed_ms: self.elapsed_ms,
            track: self.track.clone(),
        }
    }

    /// Fail with `InvalidTransition` unless `command` is allowed now
    pub fn ensure(&self, command: Command) -> Result<()> {
        if command.is_valid_from(self.state) {
            Ok(())
        } else {
            warn!(%command, state = %self.state, "Ignoring invalid tracking command");
            Err(TrackerError::InvalidTransition {
                command,
                state: self.state,
            })
        }
    }

    /// Begin a run. Returns the epoch for the first segment.
    pub fn start(&mut self, now_ms: u64, started_at: DateTime<Utc>) -> Result<u64> {
        self.ensure(Command::Start)?;
        self.track = RunTrack::new();
        self.open_segment(now_ms);
        self.started_at = Some(started_at);
        self.state = TrackingState::Running;
        info!(epoch = self.epoch, "Run started");
        Ok(self.epoch)
    }

    pub fn pause(&mut self, now_ms: u64) -> Result<()> {
        self.ensure(Command::Pause)?;
        self.freeze(now_ms);
        self.state = TrackingState::Paused;
        info!(elapsed_ms = self.elapsed_ms, "Run paused");
        Ok(())
    }

    /// Continue after a pause. Returns the epoch for the new segment.
    pub fn resume(&mut self, now_ms: u64) -> Result<u64> {
        self.ensure(Command::Resume)?;
        self.open_segment(now_ms);
        self.state = TrackingState::Running;
        info!(
            epoch = self.epoch,
            segments = self.track.segments().len(),
            "Run resumed"
        );
        Ok(self.epoch)
    }

    /// End the run and hand the recorded track over for finalization
    pub fn stop(&mut self, now_ms: u64) -> Result<FinishedRun> {
        self.ensure(Command::Stop)?;
        self.freeze(now_ms);
        self.state = TrackingState::Stopped;
        let track = std::mem::take(&mut self.track);
        info!(
            elapsed_ms = self.elapsed_ms,
            points = track.point_count(),
            "Run stopped"
        );
        Ok(FinishedRun {
            track,
            elapsed_ms: self.elapsed_ms,
            started_at: self.started_at.take().unwrap_or_else(Utc::now),
        })
    }

    /// End the run and throw the recorded track away
    pub fn cancel(&mut self, now_ms: u64) -> Result<()> {
        self.ensure(Command::Cancel)?;
        self.freeze(now_ms);
        self.state = TrackingState::Stopped;
        let discarded = std::mem::take(&mut self.track);
        self.started_at = None;
        info!(points = discarded.point_count(), "Run cancelled");
        Ok(())
    }

    /// Recompute elapsed time. Returns the new value while running.
    pub fn tick(&mut self, now_ms: u64) -> Option<u64> {
        if self.state != TrackingState::Running {
            return None;
        }
        // never publish a smaller value than before
        self.elapsed_ms = self.elapsed_ms.max(self.stopwatch.elapsed(now_ms));
        Some(self.elapsed_ms)
    }

    /// Append a batch of fixes to the open segment. Returns how many were kept.
    ///
    /// Batches are ordered by timestamp before appending; batches for a
    /// sealed segment or outside the running state are dropped whole.
    pub fn accept_fixes(&mut self, epoch: u64, mut fixes: Vec<Fix>) -> usize {
        if self.state != TrackingState::Running || epoch != self.epoch {
            debug!(
                epoch,
                current = self.epoch,
                state = %self.state,
                count = fixes.len(),
                "Dropping late location batch"
            );
            return 0;
        }

        fixes.sort_by_key(|fix| fix.timestamp);
        let mut accepted = 0;
        for fix in fixes {
            if !fix.position.is_valid() {
                debug!(
                    lat = fix.position.latitude,
                    lon = fix.position.longitude,
                    "Dropping invalid coordinate"
                );
                continue;
            }
            if self.track.push(fix.position) {
                accepted += 1;
            }
        }
        accepted
    }

    fn open_segment(&mut self, now_ms: u64) {
        self.epoch += 1;
        self.track.begin_segment();
        self.stopwatch.start(now_ms);
    }

    fn freeze(&mut self, now_ms: u64) {
        self.track.seal();
        if self.stopwatch.is_running() {
            self.elapsed_ms = self.elapsed_ms.max(self.stopwatch.stop(now_ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn started() -> (RunTracker, u64) {
        let mut tracker = RunTracker::new();
        let epoch = tracker.start(0, t(0)).unwrap();
        (tracker, epoch)
    }

    #[test]
    fn test_start_opens_one_empty_segment() {
        let (tracker, epoch) = started();
        assert_eq!(tracker.state(), TrackingState::Running);
        assert!(tracker.is_tracking());
        assert_eq!(epoch, 1);
        assert_eq!(tracker.track().segments().len(), 1);
        assert!(tracker.track().is_empty());
    }

    #[test]
    fn test_invalid_transitions_leave_state_untouched() {
        let mut tracker = RunTracker::new();
        assert!(matches!(
            tracker.pause(0),
            Err(TrackerError::InvalidTransition { command: Command::Pause, state: TrackingState::Idle })
        ));
        assert!(tracker.resume(0).is_err());
        assert!(tracker.stop(0).is_err());
        assert!(tracker.cancel(0).is_err());
        assert_eq!(tracker.state(), TrackingState::Idle);

        tracker.start(0, t(0)).unwrap();
        tracker.accept_fixes(1, vec![Fix::new(0.0, 0.0, t(1))]);
        assert!(matches!(
            tracker.start(10, t(10)),
            Err(TrackerError::InvalidTransition { command: Command::Start, .. })
        ));
        assert!(tracker.resume(10).is_err());
        assert_eq!(tracker.track().point_count(), 1);
        assert_eq!(tracker.state(), TrackingState::Running);
    }

    #[test]
    fn test_transition_table() {
        use TrackingState::*;
        let table = [
            (Command::Start, [true, false, false, false]),
            (Command::Pause, [false, true, false, false]),
            (Command::Resume, [false, false, true, false]),
            (Command::Stop, [false, true, true, false]),
            (Command::Cancel, [false, true, true, false]),
        ];
        for (command, expected) in table {
            for (state, valid) in [Idle, Running, Paused, Stopped].into_iter().zip(expected) {
                assert_eq!(command.is_valid_from(state), valid, "{} from {}", command, state);
            }
        }
    }

    #[test]
    fn test_elapsed_frozen_while_paused_and_continues_on_resume() {
        let (mut tracker, _) = started();
        assert_eq!(tracker.tick(1_000), Some(1_000));
        tracker.pause(1_500).unwrap();
        assert_eq!(tracker.elapsed_ms(), 1_500);

        assert_eq!(tracker.tick(5_000), None);
        assert_eq!(tracker.elapsed_ms(), 1_500);

        tracker.resume(10_000).unwrap();
        assert_eq!(tracker.tick(10_250), Some(1_750));
    }

    #[test]
    fn test_pause_resume_creates_second_segment_and_seals_first() {
        let (mut tracker, first) = started();
        tracker.accept_fixes(first, vec![Fix::new(0.0, 0.0, t(1)), Fix::new(0.0, 0.001, t(2))]);
        tracker.pause(2_000).unwrap();

        // late fix from before the pause
        assert_eq!(tracker.accept_fixes(first, vec![Fix::new(0.0, 0.002, t(2))]), 0);

        let second = tracker.resume(3_000).unwrap();
        assert_ne!(first, second);
        // stale epoch still rejected after resume
        assert_eq!(tracker.accept_fixes(first, vec![Fix::new(0.0, 0.003, t(3))]), 0);
        assert_eq!(tracker.accept_fixes(second, vec![Fix::new(0.0, 1.0, t(4))]), 1);

        let segments = tracker.track().segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].len(), 1);
    }

    #[test]
    fn test_batch_is_ordered_by_timestamp() {
        let (mut tracker, epoch) = started();
        let accepted = tracker.accept_fixes(
            epoch,
            vec![
                Fix::new(0.0, 0.002, t(3)),
                Fix::new(0.0, 0.0, t(1)),
                Fix::new(0.0, 0.001, t(2)),
            ],
        );
        assert_eq!(accepted, 3);
        let lons: Vec<f64> = tracker.track().segments()[0]
            .points
            .iter()
            .map(|p| p.longitude)
            .collect();
        assert_eq!(lons, vec![0.0, 0.001, 0.002]);
    }

    #[test]
    fn test_invalid_coordinates_are_dropped() {
        let (mut tracker, epoch) = started();
        let accepted = tracker.accept_fixes(
            epoch,
            vec![Fix::new(f64::NAN, 0.0, t(1)), Fix::new(10.0, 10.0, t(2))],
        );
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_stop_hands_over_track() {
        let (mut tracker, epoch) = started();
        tracker.accept_fixes(epoch, vec![Fix::new(0.0, 0.0, t(1))]);
        let finished = tracker.stop(3_000).unwrap();

        assert_eq!(finished.elapsed_ms, 3_000);
        assert_eq!(finished.started_at, t(0));
        assert_eq!(finished.track.point_count(), 1);
        assert!(!finished.track.is_open());
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert!(tracker.track().is_empty());

        // terminal
        assert!(tracker.start(4_000, t(4)).is_err());
        assert_eq!(tracker.accept_fixes(epoch, vec![Fix::new(0.0, 0.1, t(5))]), 0);
        assert_eq!(tracker.tick(5_000), None);
    }

    #[test]
    fn test_stop_from_paused_keeps_frozen_elapsed() {
        let (mut tracker, _) = started();
        tracker.pause(2_000).unwrap();
        let finished = tracker.stop(60_000).unwrap();
        assert_eq!(finished.elapsed_ms, 2_000);
    }

    #[test]
    fn test_cancel_discards_track() {
        let (mut tracker, epoch) = started();
        tracker.accept_fixes(epoch, vec![Fix::new(0.0, 0.0, t(1))]);
        tracker.cancel(1_000).unwrap();
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert!(tracker.track().is_empty());
        assert!(!tracker.snapshot().is_tracking);
        assert!(tracker.stop(2_000).is_err());
    }

    #[test]
    fn test_is_tracking_matches_running_for_command_sequences() {
        let sequences: &[&[Command]] = &[
            &[Command::Start, Command::Pause, Command::Resume, Command::Stop],
            &[Command::Start, Command::Pause, Command::Cancel],
            &[Command::Pause, Command::Start, Command::Start, Command::Resume, Command::Pause],
            &[Command::Start, Command::Stop, Command::Resume, Command::Start],
        ];
        for sequence in sequences {
            let mut tracker = RunTracker::new();
            let mut now = 0;
            for command in sequence.iter() {
                now += 100;
                let _ = match command {
                    Command::Start => tracker.start(now, t(0)).map(|_| ()),
                    Command::Pause => tracker.pause(now),
                    Command::Resume => tracker.resume(now).map(|_| ()),
                    Command::Stop => tracker.stop(now).map(|_| ()),
                    Command::Cancel => tracker.cancel(now),
                };
                let snapshot = tracker.snapshot();
                assert_eq!(snapshot.is_tracking, snapshot.state == TrackingState::Running);
            }
        }
    }

    #[test]
    fn test_elapsed_monotonic_under_jittery_ticks() {
        let (mut tracker, _) = started();
        let mut last = 0;
        for now in [50, 120, 110, 300, 299, 1_000] {
            if let Some(elapsed) = tracker.tick(now) {
                assert!(elapsed >= last);
                last = elapsed;
            }
        }
        assert_eq!(last, 1_000);
    }
}

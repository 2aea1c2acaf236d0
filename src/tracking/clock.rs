// src/tracking/clock.rs
//! Time sources and elapsed-time accounting

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic millisecond clock
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Clock backed by `Instant`, counting from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock advanced by hand
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Elapsed time computed from a wall-clock anchor plus the time banked
/// before the last pause, so tick jitter never accumulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stopwatch {
    banked_ms: u64,
    anchor_ms: Option<u64>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.anchor_ms.is_some()
    }

    pub fn start(&mut self, now_ms: u64) {
        if self.anchor_ms.is_none() {
            self.anchor_ms = Some(now_ms);
        }
    }

    /// Bank the running interval and freeze. Returns the frozen total.
    pub fn stop(&mut self, now_ms: u64) -> u64 {
        let total = self.elapsed(now_ms);
        self.banked_ms = total;
        self.anchor_ms = None;
        total
    }

    pub fn elapsed(&self, now_ms: u64) -> u64 {
        match self.anchor_ms {
            Some(anchor) => self.banked_ms + now_ms.saturating_sub(anchor),
            None => self.banked_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_continues_after_resume() {
        let mut sw = Stopwatch::new();
        sw.start(1_000);
        assert_eq!(sw.elapsed(1_750), 750);
        assert_eq!(sw.stop(2_000), 1_000);

        // frozen while stopped
        assert_eq!(sw.elapsed(9_000), 1_000);

        sw.start(10_000);
        assert_eq!(sw.elapsed(10_500), 1_500);
    }

    #[test]
    fn test_double_start_keeps_anchor() {
        let mut sw = Stopwatch::new();
        sw.start(100);
        sw.start(500);
        assert_eq!(sw.elapsed(600), 500);
    }

    #[test]
    fn test_clock_going_backwards_does_not_underflow() {
        let mut sw = Stopwatch::new();
        sw.start(1_000);
        assert_eq!(sw.elapsed(900), 0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 15);
        clock.set(3);
        assert_eq!(clock.now_ms(), 3);
    }
}

// src/location/manual.rs
//! Programmatically driven location source

use super::{Fix, FixSink, LocationRequest, LocationSource};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Debug, Default)]
struct Shared {
    sink: Mutex<Option<FixSink>>,
    permission: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// A source whose fixes are pushed by a [`ManualSourceController`].
#[derive(Debug)]
pub struct ManualSource {
    shared: Arc<Shared>,
}

/// Remote control for a [`ManualSource`] that has been handed to a tracker.
#[derive(Debug, Clone)]
pub struct ManualSourceController {
    shared: Arc<Shared>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualSourceController) {
        let shared = Arc::new(Shared::default());
        shared.permission.store(true, Ordering::Relaxed);
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ManualSourceController { shared },
        )
    }
}

impl LocationSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn has_permission(&self) -> bool {
        self.shared.permission.load(Ordering::Relaxed)
    }

    fn start_updates(&mut self, _request: &LocationRequest, sink: FixSink) {
        self.shared.starts.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.shared.sink.lock() {
            *guard = Some(sink);
        }
    }

    fn stop_updates(&mut self) {
        self.shared.stops.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.shared.sink.lock() {
            *guard = None;
        }
    }
}

impl ManualSourceController {
    /// Deliver a batch if updates are active. Returns whether it was sent.
    pub fn push(&self, fixes: Vec<Fix>) -> bool {
        let sink = match self.shared.sink.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sink {
            Some(sink) => sink.deliver(fixes),
            None => false,
        }
    }

    /// Sink of the current update session, kept to simulate in-flight
    /// deliveries after updates stop.
    pub fn current_sink(&self) -> Option<FixSink> {
        self.shared.sink.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn set_permission(&self, granted: bool) {
        self.shared.permission.store(granted, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.current_sink().is_some()
    }

    pub fn start_count(&self) -> usize {
        self.shared.starts.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> usize {
        self.shared.stops.load(Ordering::Relaxed)
    }
}

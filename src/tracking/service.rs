// src/tracking/service.rs
//! Background tracking service.
//!
//! One task owns the [`RunTracker`] and serializes everything that mutates
//! it: commands from handles, fix batches from the location source and
//! stopwatch ticks. Observers read [`TrackingSnapshot`]s from a watch channel,
//! so they only ever see whole, consistent values.

use super::clock::Clock;
use super::machine::{Command, RunTracker, TrackingSnapshot, TrackingState};
use crate::error::{Result, TrackerError};
use crate::location::{FixBatch, FixSink, LocationRequest, LocationSource};
use crate::run::{RunFinalizer, RunRecord};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Timing parameters for a tracking service
#[derive(Debug, Clone, Copy)]
pub struct TrackingOptions {
    pub timer_interval: Duration,
    pub location: LocationRequest,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            timer_interval: Duration::from_millis(50),
            location: LocationRequest::default(),
        }
    }
}

impl From<&crate::config::TrackerConfig> for TrackingOptions {
    fn from(config: &crate::config::TrackerConfig) -> Self {
        Self {
            timer_interval: config.timer_interval(),
            location: LocationRequest::from(config),
        }
    }
}

/// Commands answered with the new state. Stop is separate since it
/// answers with the saved record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Pause,
    Resume,
    Cancel,
}

impl From<Transition> for Command {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Start => Command::Start,
            Transition::Pause => Command::Pause,
            Transition::Resume => Command::Resume,
            Transition::Cancel => Command::Cancel,
        }
    }
}

enum Request {
    Transition {
        transition: Transition,
        reply: oneshot::Sender<Result<TrackingState>>,
    },
    Stop {
        reply: oneshot::Sender<Result<RunRecord>>,
    },
}

/// Cloneable handle to a running tracking service.
///
/// When every handle is dropped an unfinished run is cancelled.
#[derive(Clone)]
pub struct TrackingHandle {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<TrackingSnapshot>,
}

impl TrackingHandle {
    pub async fn start(&self) -> Result<TrackingState> {
        self.transition(Transition::Start).await
    }

    pub async fn pause(&self) -> Result<TrackingState> {
        self.transition(Transition::Pause).await
    }

    pub async fn resume(&self) -> Result<TrackingState> {
        self.transition(Transition::Resume).await
    }

    /// Discard the run without saving
    pub async fn cancel(&self) -> Result<TrackingState> {
        self.transition(Transition::Cancel).await
    }

    /// Finish the run and save it
    pub async fn stop(&self) -> Result<RunRecord> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Stop { reply })
            .await
            .map_err(|_| TrackerError::ServiceClosed)?;
        rx.await.map_err(|_| TrackerError::ServiceClosed)?
    }

    async fn transition(&self, transition: Transition) -> Result<TrackingState> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Transition { transition, reply })
            .await
            .map_err(|_| TrackerError::ServiceClosed)?;
        rx.await.map_err(|_| TrackerError::ServiceClosed)?
    }

    /// Receiver yielding the latest snapshot and every later one
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

pub struct TrackingService {
    machine: RunTracker,
    source: Box<dyn LocationSource>,
    finalizer: RunFinalizer,
    clock: Arc<dyn Clock>,
    options: TrackingOptions,
    snapshots: watch::Sender<TrackingSnapshot>,
    fixes: mpsc::UnboundedSender<FixBatch>,
}

impl TrackingService {
    /// Spawn the service task for a single run and return its handle.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(
        source: Box<dyn LocationSource>,
        finalizer: RunFinalizer,
        clock: Arc<dyn Clock>,
        options: TrackingOptions,
    ) -> TrackingHandle {
        let (request_tx, request_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (fix_tx, fix_rx) = mpsc::unbounded_channel();
        let machine = RunTracker::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let service = Self {
            machine,
            source,
            finalizer,
            clock,
            options,
            snapshots: snapshot_tx,
            fixes: fix_tx,
        };
        tokio::spawn(service.run(request_rx, fix_rx));

        TrackingHandle {
            requests: request_tx,
            snapshots: snapshot_rx,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut fixes: mpsc::UnboundedReceiver<FixBatch>,
    ) {
        let mut ticker = tokio::time::interval(self.options.timer_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(source = self.source.name(), "Tracking service ready");

        loop {
            let running = self.machine.state() == TrackingState::Running;
            tokio::select! {
                biased;

                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request, &mut ticker).await,
                    None => {
                        debug!("All tracking handles dropped");
                        self.teardown();
                        break;
                    }
                },
                Some(batch) = fixes.recv() => self.handle_fixes(batch),
                _ = ticker.tick(), if running => self.handle_tick(),
            }

            if self.machine.state() == TrackingState::Stopped {
                break;
            }
        }

        // anything queued behind the final command finds the run already over
        requests.close();
        while let Ok(request) = requests.try_recv() {
            let state = self.machine.state();
            match request {
                Request::Transition { transition, reply } => {
                    let _ = reply.send(Err(TrackerError::InvalidTransition {
                        command: transition.into(),
                        state,
                    }));
                }
                Request::Stop { reply } => {
                    let _ = reply.send(Err(TrackerError::InvalidTransition {
                        command: Command::Stop,
                        state,
                    }));
                }
            }
        }
        info!("Tracking service finished");
    }

    async fn handle_request(&mut self, request: Request, ticker: &mut Interval) {
        match request {
            Request::Transition { transition, reply } => {
                let result = self.apply(transition, ticker);
                let _ = reply.send(result);
            }
            Request::Stop { reply } => {
                let result = self.stop().await;
                let _ = reply.send(result);
            }
        }
    }

    fn apply(&mut self, transition: Transition, ticker: &mut Interval) -> Result<TrackingState> {
        match transition {
            Transition::Start => self.start(ticker),
            Transition::Pause => self.pause(),
            Transition::Resume => self.resume(ticker),
            Transition::Cancel => self.cancel(),
        }
    }

    fn check_permission(&self) -> Result<()> {
        if self.source.has_permission() {
            Ok(())
        } else {
            warn!(source = self.source.name(), "Location permission missing");
            Err(TrackerError::PermissionDenied)
        }
    }

    fn activate(&mut self, epoch: u64, ticker: &mut Interval) {
        let sink = FixSink::new(epoch, self.fixes.clone());
        self.source.start_updates(&self.options.location, sink);
        ticker.reset();
    }

    fn start(&mut self, ticker: &mut Interval) -> Result<TrackingState> {
        self.machine.ensure(Command::Start)?;
        self.check_permission()?;
        let epoch = self.machine.start(self.clock.now_ms(), Utc::now())?;
        self.activate(epoch, ticker);
        self.publish();
        Ok(self.machine.state())
    }

    fn pause(&mut self) -> Result<TrackingState> {
        self.machine.pause(self.clock.now_ms())?;
        self.source.stop_updates();
        self.publish();
        Ok(self.machine.state())
    }

    fn resume(&mut self, ticker: &mut Interval) -> Result<TrackingState> {
        self.machine.ensure(Command::Resume)?;
        self.check_permission()?;
        let epoch = self.machine.resume(self.clock.now_ms())?;
        self.activate(epoch, ticker);
        self.publish();
        Ok(self.machine.state())
    }

    fn cancel(&mut self) -> Result<TrackingState> {
        self.machine.cancel(self.clock.now_ms())?;
        self.source.stop_updates();
        self.publish();
        Ok(self.machine.state())
    }

    async fn stop(&mut self) -> Result<RunRecord> {
        let finished = self.machine.stop(self.clock.now_ms())?;
        self.source.stop_updates();
        self.publish();

        let finalizer = self.finalizer.clone();
        tokio::task::spawn_blocking(move || finalizer.finalize(finished))
            .await
            .map_err(|e| TrackerError::Other(format!("Run finalization task failed: {}", e)))?
    }

    fn teardown(&mut self) {
        if matches!(self.machine.state(), TrackingState::Running | TrackingState::Paused) {
            if let Err(e) = self.cancel() {
                warn!(error = %e, "Failed to cancel run on shutdown");
            }
        }
    }

    fn handle_fixes(&mut self, batch: FixBatch) {
        if self.machine.accept_fixes(batch.epoch, batch.fixes) > 0 {
            self.publish();
        }
    }

    fn handle_tick(&mut self) {
        if let Some(elapsed_ms) = self.machine.tick(self.clock.now_ms()) {
            self.snapshots.send_if_modified(|snapshot| {
                if snapshot.elapsed_ms == elapsed_ms {
                    return false;
                }
                snapshot.elapsed_ms = elapsed_ms;
                true
            });
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.machine.snapshot());
    }
}

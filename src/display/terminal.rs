// src/display/terminal.rs
//! Live run dashboard for the terminal

use crate::{
    error::{Result, TrackerError},
    run::{finalizer, stats, RunRecord},
    tracking::{TrackingHandle, TrackingSnapshot, TrackingState},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::warn;

const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// User intents read from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardAction {
    TogglePause,
    Stop,
    Cancel,
}

impl DashboardAction {
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Self::Cancel),
            KeyCode::Char(' ') | KeyCode::Char('p') => Some(Self::TogglePause),
            KeyCode::Char('s') => Some(Self::Stop),
            KeyCode::Char('c') | KeyCode::Char('q') | KeyCode::Esc => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Restores the terminal however the dashboard exits
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), Hide, DisableLineWrap)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, EnableLineWrap);
        let _ = terminal::disable_raw_mode();
    }
}

pub struct RunDashboard {
    runner_name: Option<String>,
    weight_kg: f64,
    source_name: String,
}

impl RunDashboard {
    pub fn new(runner_name: Option<String>, weight_kg: f64, source_name: impl Into<String>) -> Self {
        Self {
            runner_name,
            weight_kg,
            source_name: source_name.into(),
        }
    }

    /// Drive one run from the keyboard until it is stopped or cancelled.
    ///
    /// Returns the saved record, or `None` if the run was cancelled.
    pub async fn run(&self, handle: TrackingHandle) -> Result<Option<RunRecord>> {
        let _guard = TerminalGuard::enter()?;
        let mut stdout = io::stdout();

        let (action_tx, mut actions) = mpsc::unbounded_channel();
        let reading = Arc::new(AtomicBool::new(true));
        let reader = spawn_key_reader(action_tx, Arc::clone(&reading));

        let mut snapshots = handle.subscribe();
        let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
        let mut status = String::from("Press space to start");

        let outcome = loop {
            tokio::select! {
                Some(action) = actions.recv() => {
                    let state = snapshots.borrow().state;
                    match (action, state) {
                        (DashboardAction::TogglePause, TrackingState::Idle) => {
                            status = describe(handle.start().await, "Running");
                        }
                        (DashboardAction::TogglePause, TrackingState::Running) => {
                            status = describe(handle.pause().await, "Paused");
                        }
                        (DashboardAction::TogglePause, TrackingState::Paused) => {
                            status = describe(handle.resume().await, "Running");
                        }
                        (DashboardAction::Stop, TrackingState::Idle) => {
                            status = "Nothing to save yet".to_string();
                        }
                        (DashboardAction::Stop, _) => break handle.stop().await.map(Some),
                        (DashboardAction::Cancel, TrackingState::Idle) => break Ok(None),
                        (DashboardAction::Cancel, _) => break handle.cancel().await.map(|_| None),
                        (DashboardAction::TogglePause, TrackingState::Stopped) => break Ok(None),
                    }
                }
                _ = refresh.tick() => {
                    let snapshot = snapshots.borrow_and_update().clone();
                    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
                    self.render(&mut stdout, &snapshot, &status)?;
                    stdout.flush()?;
                }
            }
        };

        reading.store(false, Ordering::Relaxed);
        if let Err(e) = reader.await {
            warn!(error = %e, "Key reader task failed");
        }
        outcome
    }

    /// Render the dashboard for one snapshot
    pub fn render(&self, out: &mut impl Write, snapshot: &TrackingSnapshot, status: &str) -> Result<()> {
        for (row, (color, text)) in self.lines(snapshot, status).into_iter().enumerate() {
            execute!(out, MoveTo(0, row as u16))?;
            match color {
                Some(color) => execute!(out, SetForegroundColor(color), Print(text), ResetColor)?,
                None => execute!(out, Print(text))?,
            }
        }
        Ok(())
    }

    fn lines(&self, snapshot: &TrackingSnapshot, status: &str) -> Vec<(Option<Color>, String)> {
        let rule = "=".repeat(50);
        let title = match &self.runner_name {
            Some(name) => format!("Run Tracker - Let's go, {}!", name),
            None => "Run Tracker".to_string(),
        };
        let (label, color) = match snapshot.state {
            TrackingState::Idle => ("READY", Color::White),
            TrackingState::Running => ("RUNNING", Color::Green),
            TrackingState::Paused => ("PAUSED", Color::Yellow),
            TrackingState::Stopped => ("FINISHED", Color::Blue),
        };

        let distance_m = snapshot.track.distance_meters();
        let speed = finalizer::average_speed_kmh(distance_m, snapshot.elapsed_ms);
        let position = match snapshot.track.last_point() {
            Some(p) => format!("{:.6}, {:.6}", p.latitude, p.longitude),
            None => "No fix".to_string(),
        };

        vec![
            (Some(Color::Green), rule.clone()),
            (Some(Color::Green), title),
            (Some(Color::Green), rule.clone()),
            (Some(color), format!("  {}   ({})", label, self.source_name)),
            (None, String::new()),
            (Some(Color::Cyan), "RUN:".to_string()),
            (None, format!("  Time:       {:>14}", stats::format_stopwatch(snapshot.elapsed_ms, true))),
            (None, format!("  Distance:   {:>11.2} km", distance_m / 1000.0)),
            (None, format!("  Speed:      {:>9.1} km/h", speed)),
            (None, format!("  Pace:    {:>9.2} min/km", stats::kmh_to_min_per_km(speed))),
            (None, format!(
                "  Calories:   {:>9.0} kcal",
                finalizer::calories_burned(distance_m, self.weight_kg)
            )),
            (None, String::new()),
            (Some(Color::Magenta), "ROUTE:".to_string()),
            (None, format!("  Segments:   {:>14}", snapshot.track.segments().len())),
            (None, format!("  Points:     {:>14}", snapshot.track.point_count())),
            (None, format!("  Position:   {:>14}", position)),
            (None, String::new()),
            (Some(Color::Blue), format!("  {}", status)),
            (Some(Color::Green), rule),
            (Some(Color::Green), "space: start/pause/resume   s: stop & save   q: discard".to_string()),
        ]
    }
}

fn describe(result: Result<TrackingState>, ok: &str) -> String {
    match result {
        Ok(_) => ok.to_string(),
        Err(TrackerError::PermissionDenied) => "Location access denied".to_string(),
        Err(e) => e.to_string(),
    }
}

fn spawn_key_reader(
    actions: mpsc::UnboundedSender<DashboardAction>,
    reading: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while reading.load(Ordering::Relaxed) {
            match event::poll(REFRESH_INTERVAL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if let Some(action) = DashboardAction::from_key(&key) {
                            if actions.send(action).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to read terminal event");
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to poll terminal events");
                    break;
                }
            }
        }
    })
}

// src/location/mod.rs
//! Location sources that feed position fixes into a run

pub mod fix;
pub mod gpsd;
pub mod manual;
pub mod nmea;
pub mod replay;
pub mod serial;

pub use fix::{Fix, LatLng};
pub use gpsd::GpsdSource;
pub use manual::{ManualSource, ManualSourceController};
pub use replay::ReplaySource;
pub use serial::SerialSource;

use crate::error::{Result, TrackerError};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::{io::AsyncBufRead, io::AsyncBufReadExt, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Requested delivery cadence for position fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    /// Preferred interval between fixes
    pub interval: Duration,
    /// Fixes closer together than this are dropped
    pub fastest_interval: Duration,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            fastest_interval: Duration::from_millis(2000),
        }
    }
}

impl From<&crate::config::TrackerConfig> for LocationRequest {
    fn from(config: &crate::config::TrackerConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.location_interval_ms),
            fastest_interval: Duration::from_millis(config.fastest_location_interval_ms),
        }
    }
}

pub const DEFAULT_GPSD_HOST: &str = "localhost";
pub const DEFAULT_GPSD_PORT: u16 = 2947;
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Build the location source selected in the configuration
pub fn source_from_config(config: &crate::config::TrackerConfig) -> Result<Box<dyn LocationSource>> {
    match config.source_type.as_str() {
        "gpsd" => Ok(Box::new(GpsdSource::new(
            config.gpsd_host.clone().unwrap_or_else(|| DEFAULT_GPSD_HOST.to_string()),
            config.gpsd_port.unwrap_or(DEFAULT_GPSD_PORT),
        ))),
        "serial" => {
            let port = config
                .serial_port
                .clone()
                .ok_or_else(|| TrackerError::Config("serial source needs serial_port".to_string()))?;
            Ok(Box::new(SerialSource::new(
                port,
                config.serial_baudrate.unwrap_or(DEFAULT_BAUDRATE),
            )))
        }
        "replay" => {
            let path = config
                .replay_path
                .as_deref()
                .ok_or_else(|| TrackerError::Config("replay source needs replay_path".to_string()))?;
            Ok(Box::new(ReplaySource::from_file(path)?))
        }
        other => Err(TrackerError::Config(format!("Unknown location source: {}", other))),
    }
}

/// A batch of fixes delivered together, tagged with the segment epoch it
/// was requested for.
#[derive(Debug, Clone)]
pub struct FixBatch {
    pub epoch: u64,
    pub fixes: Vec<Fix>,
}

/// Delivery handle given to a source when updates start.
#[derive(Debug, Clone)]
pub struct FixSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<FixBatch>,
}

impl FixSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<FixBatch>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Push a batch to the tracker. Returns false once the tracker is gone.
    pub fn deliver(&self, fixes: Vec<Fix>) -> bool {
        if fixes.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx
            .send(FixBatch {
                epoch: self.epoch,
                fixes,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Provider of position fixes.
///
/// `start_updates` must not block; connection problems are reported through
/// logging and simply result in no fixes. After `stop_updates` returns the
/// source must not deliver anything except possibly one batch already in flight.
pub trait LocationSource: Send {
    fn name(&self) -> &str;

    /// Whether the source may currently be used
    fn has_permission(&self) -> bool;

    fn start_updates(&mut self, request: &LocationRequest, sink: FixSink);

    fn stop_updates(&mut self);
}

/// Drops fixes that arrive faster than the requested rate, or out of order.
#[derive(Debug, Clone)]
pub struct FixThrottle {
    fastest: chrono::Duration,
    last: Option<DateTime<Utc>>,
}

impl FixThrottle {
    pub fn new(fastest_interval: Duration) -> Self {
        Self {
            fastest: chrono::Duration::from_std(fastest_interval).unwrap_or(chrono::Duration::zero()),
            last: None,
        }
    }

    pub fn admit(&mut self, fix: &Fix) -> bool {
        if let Some(last) = self.last {
            if fix.timestamp.signed_duration_since(last) < self.fastest {
                return false;
            }
        }
        self.last = Some(fix.timestamp);
        true
    }
}

/// Background task delivering fixes for one update session
#[derive(Debug, Default)]
pub(crate) struct UpdateTask {
    handle: Option<JoinHandle<()>>,
}

impl UpdateTask {
    pub(crate) fn replace(&mut self, handle: JoinHandle<()>) {
        self.stop();
        self.handle = Some(handle);
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for UpdateTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read a line-oriented feed, turning each parsed line into a single-fix batch.
///
/// Lines that are not valid UTF-8 are skipped; only I/O errors end the feed.
pub(crate) async fn pump_lines<R, F>(
    mut reader: R,
    source: &'static str,
    sink: FixSink,
    mut throttle: FixThrottle,
    parse: F,
) where
    R: AsyncBufRead + Unpin,
    F: Fn(&str) -> Option<Fix>,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!(source, "Location feed closed");
                break;
            }
            Ok(_) => {
                let Ok(line) = std::str::from_utf8(&buf) else {
                    debug!(source, bytes = buf.len(), "Skipping line that is not UTF-8");
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(fix) = parse(line) else {
                    continue;
                };
                if !throttle.admit(&fix) {
                    continue;
                }
                debug!(
                    source,
                    lat = fix.position.latitude,
                    lon = fix.position.longitude,
                    "New location"
                );
                if !sink.deliver(vec![fix]) {
                    debug!(source, "Tracker dropped, ending location feed");
                    break;
                }
            }
            Err(e) => {
                warn!(source, error = %e, "Error reading location feed");
                break;
            }
        }
    }
}

// src/location/serial.rs
//! NMEA-over-serial location source

use super::{nmea, pump_lines, FixSink, FixThrottle, LocationRequest, LocationSource, UpdateTask};
use crate::error::{Result, TrackerError};
use std::time::Duration;
use tokio::io::BufReader;
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info};

pub struct SerialSource {
    port: String,
    baudrate: u32,
    task: UpdateTask,
}

impl SerialSource {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
            task: UpdateTask::default(),
        }
    }
}

impl LocationSource for SerialSource {
    fn name(&self) -> &str {
        "serial"
    }

    /// The device node must exist and carry a read bit. Only metadata is
    /// inspected; the port is opened by the update task.
    fn has_permission(&self) -> bool {
        match std::fs::metadata(&self.port) {
            Ok(meta) => !meta.is_dir() && readable(&meta),
            Err(_) => false,
        }
    }

    fn start_updates(&mut self, request: &LocationRequest, sink: FixSink) {
        let port = self.port.clone();
        let baudrate = self.baudrate;
        let throttle = FixThrottle::new(request.fastest_interval);

        let handle = tokio::spawn(async move {
            info!(%port, baudrate, "Connecting to GPS");
            let serial = match tokio_serial::new(&port, baudrate)
                .timeout(Duration::from_millis(1000))
                .open_native_async()
            {
                Ok(serial) => serial,
                Err(e) => {
                    error!(%port, error = %e, "Failed to open serial port, no fixes will be recorded");
                    return;
                }
            };
            pump_lines(BufReader::new(serial), "serial", sink, throttle, nmea::parse_nmea_sentence).await;
        });
        self.task.replace(handle);
    }

    fn stop_updates(&mut self) {
        self.task.stop();
    }
}

#[cfg(unix)]
fn readable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & 0o444 != 0
}

#[cfg(not(unix))]
fn readable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// List available serial ports as `(name, description)` pairs
pub fn list_serial_ports() -> Result<Vec<(String, String)>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TrackerError::Other(format!("Failed to list serial ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|port| (port.port_name, format!("{:?}", port.port_type)))
        .collect())
}

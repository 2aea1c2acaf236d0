// src/location/gpsd.rs
//! gpsd client location source

use super::{pump_lines, Fix, FixSink, FixThrottle, LocationRequest, LocationSource, UpdateTask};
use crate::error::{Result, TrackerError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(format!("{}:{}", host, port))
        .await
        .map_err(|e| TrackerError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e)))?;

    // Send WATCH command to start receiving JSON data
    let watch_cmd = "?WATCH={\"enable\":true,\"json\":true}\n";
    stream
        .write_all(watch_cmd.as_bytes())
        .await
        .map_err(|e| TrackerError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data.
///
/// Returns a fix for TPV reports with at least a 2D fix.
pub fn parse_gpsd_json(line: &str) -> Result<Option<Fix>> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| TrackerError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    let fix = match msg.class.as_str() {
        "TPV" => parse_tpv_message(&msg.data),
        "VERSION" => {
            if let Some(version) = msg.data.get("release").and_then(|v| v.as_str()) {
                info!(version, "Connected to gpsd");
            }
            None
        }
        "DEVICES" => {
            if let Some(devices) = msg.data.get("devices").and_then(|v| v.as_array()) {
                info!(count = devices.len(), "gpsd managing devices");
            }
            None
        }
        _ => None,
    };

    Ok(fix)
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(msg_data: &HashMap<String, serde_json::Value>) -> Option<Fix> {
    let mode = msg_data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    if mode < 2 {
        return None;
    }

    let lat = msg_data.get("lat").and_then(|v| v.as_f64())?;
    let lon = msg_data.get("lon").and_then(|v| v.as_f64())?;

    let timestamp = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Fix::new(lat, lon, timestamp))
}

/// Location source reading TPV reports from gpsd
pub struct GpsdSource {
    host: String,
    port: u16,
    task: UpdateTask,
}

impl GpsdSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            task: UpdateTask::default(),
        }
    }
}

impl LocationSource for GpsdSource {
    fn name(&self) -> &str {
        "gpsd"
    }

    fn has_permission(&self) -> bool {
        true
    }

    fn start_updates(&mut self, request: &LocationRequest, sink: FixSink) {
        let host = self.host.clone();
        let port = self.port;
        let throttle = FixThrottle::new(request.fastest_interval);

        let handle = tokio::spawn(async move {
            info!(%host, port, "Connecting to gpsd");
            let reader = match connect_gpsd(&host, port).await {
                Ok(reader) => reader,
                Err(e) => {
                    error!(error = %e, "gpsd unavailable, no fixes will be recorded");
                    return;
                }
            };
            pump_lines(reader, "gpsd", sink, throttle, |line| {
                parse_gpsd_json(line).unwrap_or_else(|e| {
                    debug!(error = %e, "Skipping gpsd line");
                    None
                })
            })
            .await;
        });
        self.task.replace(handle);
    }

    fn stop_updates(&mut self) {
        self.task.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_tpv_parsing() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"2023-01-01T12:00:05.000Z","ept":0.005,"lat":48.117,"lon":11.517,"alt":545.4,"track":10.3797,"speed":0.091}"#;

        let fix = parse_gpsd_json(json).unwrap().unwrap();

        assert_eq!(fix.position.latitude, 48.117);
        assert_eq!(fix.position.longitude, 11.517);
        assert_eq!(fix.timestamp.hour(), 12);
        assert_eq!(fix.timestamp.second(), 5);
    }

    #[test]
    fn test_tpv_without_fix_is_ignored() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":1}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_sky_is_ignored() {
        let json = r#"{"class":"SKY","hdop":1.2,"satellites":[{"PRN":1,"ss":42,"used":true}]}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_invalid_json() {
        let invalid_json = r#"{"invalid": json"#;
        assert!(matches!(parse_gpsd_json(invalid_json), Err(TrackerError::Parse(_))));
    }

    #[tokio::test]
    async fn test_source_streams_fixes_from_gpsd() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::mpsc;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"{\"class\":\"VERSION\",\"release\":\"3.25\"}\n{\"class\":\"TPV\",\"mode\":3,\"time\":\"2023-01-01T12:00:00Z\",\"lat\":1.0,\"lon\":2.0}\n")
                .await
                .unwrap();
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = GpsdSource::new("127.0.0.1", port);
        source.start_updates(&LocationRequest::default(), FixSink::new(3, tx));

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.epoch, 3);
        assert_eq!(batch.fixes[0].position.latitude, 1.0);
        source.stop_updates();
    }
}

// src/config.rs
//! Configuration management with file-backed storage

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub source_type: String,  // "gpsd", "serial", "replay"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub replay_path: Option<PathBuf>,
    pub runner_name: Option<String>,
    pub weight_kg: f64,
    pub location_interval_ms: u64,
    pub fastest_location_interval_ms: u64,
    pub timer_interval_ms: u64,
    pub database_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(9600),
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            replay_path: None,
            runner_name: None,
            weight_kg: 80.0,
            location_interval_ms: 5000,
            fastest_location_interval_ms: 2000,
            timer_interval_ms: 50,
            database_path: None,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load configuration from a file, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TrackerError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| TrackerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(TrackerError::Config(format!(
                "weight_kg must be positive, got {}",
                self.weight_kg
            )));
        }
        if self.timer_interval_ms == 0 || self.location_interval_ms == 0 {
            return Err(TrackerError::Config("intervals must be non-zero".to_string()));
        }
        if self.fastest_location_interval_ms > self.location_interval_ms {
            return Err(TrackerError::Config(
                "fastest_location_interval_ms must not exceed location_interval_ms".to_string(),
            ));
        }
        Ok(())
    }

    fn home_dir() -> Result<PathBuf> {
        std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| TrackerError::Config("HOME environment variable not set".to_string()))
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join(".config").join("run-tracker").join("config.json"))
    }

    /// Path of the run history file
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::home_dir()?
                .join(".local")
                .join("share")
                .join("run-tracker")
                .join("runs.json")),
        }
    }

    /// Log file used while the live dashboard owns the terminal
    pub fn log_path(&self) -> Result<PathBuf> {
        let history = self.database_path()?;
        let dir = history.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(dir.join("run-tracker.log"))
    }

    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }

    /// Update configuration with new source settings
    pub fn update_source(&mut self, source_type: &str) {
        self.source_type = source_type.to_string();
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }

    pub fn update_replay(&mut self, path: PathBuf) {
        self.source_type = "replay".to_string();
        self.replay_path = Some(path);
    }

    /// Update the runner profile used for calorie estimates
    pub fn update_profile(&mut self, name: Option<String>, weight_kg: Option<f64>) -> Result<()> {
        if let Some(name) = name {
            self.runner_name = Some(name);
        }
        if let Some(weight) = weight_kg {
            let previous = self.weight_kg;
            self.weight_kg = weight;
            if let Err(e) = self.validate() {
                self.weight_kg = previous;
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.source_type, "gpsd");
        assert_eq!(config.weight_kg, 80.0);
        assert_eq!(config.timer_interval(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_update_serial() {
        let mut config = TrackerConfig::default();
        config.update_serial("/dev/ttyUSB0".to_string(), 115200);
        assert_eq!(config.source_type, "serial");
        assert_eq!(config.serial_port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(config.serial_baudrate, Some(115200));
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let mut config = TrackerConfig::default();
        assert!(config.update_profile(None, Some(0.0)).is_err());
        assert_eq!(config.weight_kg, 80.0);

        config.update_profile(Some("Ana".to_string()), Some(62.5)).unwrap();
        assert_eq!(config.weight_kg, 62.5);
        assert_eq!(config.runner_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_fastest_interval_bound() {
        let config = TrackerConfig {
            fastest_location_interval_ms: 6000,
            ..TrackerConfig::default()
        };
        assert!(matches!(config.validate(), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = TrackerConfig::default();
        config.update_gpsd("10.0.0.2".to_string(), 2948);
        config.save_to(&path).unwrap();

        let loaded = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gpsd_host.as_deref(), Some("10.0.0.2"));
        assert_eq!(loaded.gpsd_port, Some(2948));
    }

    #[test]
    fn test_log_file_sits_next_to_history() {
        let config = TrackerConfig {
            database_path: Some(PathBuf::from("/data/runs/history.json")),
            ..TrackerConfig::default()
        };
        assert_eq!(config.log_path().unwrap(), PathBuf::from("/data/runs/run-tracker.log"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = TrackerConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.source_type, "gpsd");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"weight_kg": 70.0}"#).unwrap();

        let loaded = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(loaded.weight_kg, 70.0);
        assert_eq!(loaded.location_interval_ms, 5000);
    }
}

//! Application settings loaded from a TOML file plus environment overrides.
//!
//! Every field has a default, so a missing config file yields a usable
//! configuration (mock mode and tests run with no file at all). Environment
//! variables prefixed `THERMODAQ_` override file values, with `__` as the
//! section separator (`THERMODAQ_SERIAL__BAUD_RATE=115200`).

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{AppResult, ThermoError};
use crate::link::LinkConfig;
use crate::protocol::WireFormat;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port path, e.g. "/dev/ttyUSB0" or "COM3".
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Window after which a stale partial line is discarded.
    pub read_timeout_secs: u64,
    /// Poll interval of the blocking read; bounds stop latency.
    pub poll_interval_ms: u64,
    /// Bounded wait for the reader thread on disconnect.
    pub join_timeout_secs: u64,
    pub wire_format: WireFormat,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout_secs: 2,
            poll_interval_ms: 100,
            join_timeout_secs: 5,
            wire_format: WireFormat::Json,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Samples averaged per emitted reading.
    pub batch_size: usize,
    pub calibration_enabled: bool,
    pub reference_enabled: bool,
    /// Assembly whose calibration set is loaded at startup.
    pub assembly_id: u32,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            calibration_enabled: false,
            reference_enabled: false,
            assembly_id: 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for CSV session logs.
    pub default_path: String,
    /// Start a session log as soon as readings flow.
    pub log_on_start: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_path: "./data".to_string(),
            log_on_start: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Path of the versioned calibration document.
    pub store_path: String,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            store_path: "./calibration.json".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: Option<String>,
    pub serial: SerialSettings,
    pub acquisition: AcquisitionSettings,
    pub storage: StorageSettings,
    pub calibration: CalibrationSettings,
}

impl Settings {
    /// Load settings from `path` (optional) with `THERMODAQ_` env overrides.
    pub fn new(path: Option<&str>) -> AppResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        } else {
            builder = builder.add_source(File::with_name("thermodaq").required(false));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("THERMODAQ").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> AppResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ThermoError::Configuration(
                "serial.baud_rate must be non-zero".to_string(),
            ));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ThermoError::Configuration(
                "serial.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.acquisition.batch_size == 0 {
            return Err(ThermoError::Configuration(
                "acquisition.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Link parameters derived from the serial section.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            port_name: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_secs(self.serial.read_timeout_secs),
            poll_interval: Duration::from_millis(self.serial.poll_interval_ms),
            join_timeout: Duration::from_secs(self.serial.join_timeout_secs),
            wire_format: self.serial.wire_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_defaults_are_usable_without_a_file() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.acquisition.batch_size, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermodaq.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[serial]\nport = \"/dev/ttyUSB1\"\nbaud_rate = 115200\nwire_format = \"legacy\"\n\n[acquisition]\nbatch_size = 5"
        )
        .unwrap();

        let settings = Settings::new(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.serial.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(settings.serial.baud_rate, 115200);
        assert_eq!(settings.serial.wire_format, WireFormat::LegacyDelimited);
        assert_eq!(settings.acquisition.batch_size, 5);
        // Sections not present keep defaults.
        assert_eq!(settings.storage.default_path, "./data");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermodaq.toml");
        fs::write(&path, "[acquisition]\nbatch_size = 0\n").unwrap();

        let err = Settings::new(Some(path.to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ThermoError::Configuration(_)));
    }

    #[test]
    fn test_link_config_unit_conversion() {
        let settings = Settings::default();
        let link = settings.link_config();
        assert_eq!(link.read_timeout, Duration::from_secs(2));
        assert_eq!(link.poll_interval, Duration::from_millis(100));
        assert_eq!(link.join_timeout, Duration::from_secs(5));
    }
}

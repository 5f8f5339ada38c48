//! CSV session logging with clean feature flag handling.
//!
//! A [`ReadingLogger`] owns one session file. The file is created lazily on
//! the first logged reading so toggling logging on and immediately off again
//! leaves no empty files behind. One row per emitted reading; the active
//! coefficient set is recorded alongside each channel so a session file is
//! self-describing even after the calibration store changes.

use std::path::PathBuf;

use crate::calibration::SensorAssembly;
use crate::core::Reading;
use crate::error::AppResult;

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use crate::core::Channel;
    use std::fs::{self, File};

    pub struct ReadingLogger {
        directory: PathBuf,
        path: Option<PathBuf>,
        writer: Option<csv::Writer<File>>,
    }

    impl ReadingLogger {
        /// Logger writing session files under `directory`.
        pub fn new(directory: impl Into<PathBuf>) -> Self {
            Self {
                directory: directory.into(),
                path: None,
                writer: None,
            }
        }

        /// Path of the session file, once the first reading has been logged.
        pub fn path(&self) -> Option<&PathBuf> {
            self.path.as_ref()
        }

        fn ensure_open(&mut self, assembly: &SensorAssembly) -> AppResult<()> {
            if self.writer.is_none() {
                if !self.directory.exists() {
                    fs::create_dir_all(&self.directory)?;
                }
                let file_name = format!(
                    "assembly_{}_{}.csv",
                    assembly.id(),
                    chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f")
                );
                let path = self.directory.join(file_name);
                let mut writer = csv::Writer::from_writer(File::create(&path)?);

                let mut header = vec![
                    "Timestamp".to_string(),
                    "Calibration On".to_string(),
                    "Ref Temperature".to_string(),
                ];
                for ch in Channel::ALL {
                    header.push(format!("Raw {}", ch.name()));
                    header.push(format!("Calibrated {}", ch.name()));
                    header.push(format!("Coeffs {}", ch.name()));
                }
                writer.write_record(&header)?;

                log::info!("Session log opened at '{}'.", path.display());
                self.path = Some(path);
                self.writer = Some(writer);
            }
            Ok(())
        }

        /// Append one reading, creating the session file if needed.
        pub fn log(&mut self, reading: &Reading, assembly: &SensorAssembly) -> AppResult<()> {
            let mut record = vec![
                reading.timestamp.to_rfc3339(),
                reading.calibrated.to_string(),
                reading
                    .reference
                    .map_or(String::new(), |r| format!("{r:.3}")),
            ];
            for ch in Channel::ALL {
                record.push(format!("{:.3}", reading.raw[ch.index()]));
                record.push(format!("{:.3}", reading.values[ch.index()]));
                record.push(serde_json::to_string(
                    assembly.calibration(ch).coefficients(),
                )?);
            }

            self.ensure_open(assembly)?;
            if let Some(writer) = self.writer.as_mut() {
                writer.write_record(&record)?;
                writer.flush()?;
            }
            Ok(())
        }

        /// Flush and close the session file; the next `log` starts a new one.
        pub fn close(&mut self) -> AppResult<()> {
            if let Some(mut writer) = self.writer.take() {
                writer.flush()?;
                log::info!("Session log closed.");
            }
            self.path = None;
            Ok(())
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use crate::error::ThermoError;

    pub struct ReadingLogger;

    impl ReadingLogger {
        pub fn new(_directory: impl Into<PathBuf>) -> Self {
            Self
        }

        pub fn path(&self) -> Option<&PathBuf> {
            None
        }

        pub fn log(&mut self, _reading: &Reading, _assembly: &SensorAssembly) -> AppResult<()> {
            Err(ThermoError::FeatureNotEnabled("storage_csv".to_string()))
        }

        pub fn close(&mut self) -> AppResult<()> {
            Ok(())
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::ReadingLogger;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::ReadingLogger;

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::calibration::SensorCalibration;
    use crate::core::Channel;
    use chrono::Utc;
    use std::fs;

    fn reading() -> Reading {
        Reading {
            timestamp: Utc::now(),
            raw: [10.0, 11.0, 12.0, 13.0, 14.0, 15.0],
            values: [10.5, 11.5, 12.5, 13.5, 14.5, 15.5],
            reference: Some(20.0),
            calibrated: true,
        }
    }

    #[test]
    fn test_file_created_on_first_log_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ReadingLogger::new(dir.path());
        assert!(logger.path().is_none());

        logger.log(&reading(), &SensorAssembly::new(4)).unwrap();
        let path = logger.path().unwrap().clone();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("assembly_4_"));
    }

    #[test]
    fn test_header_and_row_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ReadingLogger::new(dir.path());

        let mut assembly = SensorAssembly::new(1);
        assembly.set_calibration(
            Channel::T1,
            SensorCalibration::new(vec![1.02, -0.5]).unwrap(),
        );
        logger.log(&reading(), &assembly).unwrap();
        logger.close().unwrap();

        let text = fs::read_to_string(
            fs::read_dir(dir.path())
                .unwrap()
                .next()
                .unwrap()
                .unwrap()
                .path(),
        )
        .unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Timestamp,Calibration On,Ref Temperature,Raw t1,Calibrated t1,Coeffs t1"));

        let row = lines.next().unwrap();
        assert!(row.contains("true"));
        assert!(row.contains("20.000"));
        assert!(row.contains("10.000"));
        assert!(row.contains("10.500"));
        assert!(row.contains("[1.02,-0.5]"));
    }

    #[test]
    fn test_close_then_log_starts_new_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ReadingLogger::new(dir.path());
        let assembly = SensorAssembly::new(1);

        logger.log(&reading(), &assembly).unwrap();
        logger.close().unwrap();
        assert!(logger.path().is_none());

        std::thread::sleep(std::time::Duration::from_millis(5));
        logger.log(&reading(), &assembly).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}

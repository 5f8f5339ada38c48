//! Persisted calibration coefficients.
//!
//! The store is a narrow key-value collaborator: load the coefficient set
//! for an assembly id at connect time, save it on an explicit user action.
//! On disk it is a single versioned JSON document:
//!
//! - **Version 2** (written): per assembly id, one coefficient list per
//!   channel name, highest-degree first.
//! - **Version 1** (read-only legacy): per assembly id, one flat two-point
//!   tuple per channel (`raw_low, ref_low, raw_high, ref_high`). Converted
//!   to polynomial form on load; never written back, and never intermixed
//!   with the version-2 shape.
//!
//! Loading an assembly id with no stored entry yields an identity-calibrated
//! assembly, the same default a fresh assembly gets.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{SensorAssembly, SensorCalibration};
use crate::core::Channel;
use crate::error::{AppResult, ThermoError};

/// Load/save view of per-assembly calibration coefficients.
pub trait CalibrationStore {
    /// Load the stored assembly, or an identity-calibrated default when the
    /// id has never been saved.
    fn load(&self, assembly_id: u32) -> AppResult<SensorAssembly>;

    /// Persist one assembly, replacing any previous entry for its id.
    fn save(&self, assembly: &SensorAssembly) -> AppResult<()>;
}

const CURRENT_VERSION: u32 = 2;

/// Version-2 document: assembly id -> channel name -> coefficient list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PolynomialDocument {
    version: u32,
    assemblies: BTreeMap<u32, BTreeMap<String, Vec<f64>>>,
}

/// Version-1 legacy entry: flat two-point columns per channel.
#[derive(Debug, Deserialize)]
struct TwoPointEntry {
    raw_low: f64,
    ref_low: f64,
    raw_high: f64,
    ref_high: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[allow(dead_code)]
    version: u32,
    assemblies: BTreeMap<u32, BTreeMap<String, TwoPointEntry>>,
}

/// Envelope used to sniff the schema version before committing to a shape.
#[derive(Debug, Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

/// JSON-file-backed calibration store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> AppResult<PolynomialDocument> {
        if !self.path.exists() {
            return Ok(PolynomialDocument {
                version: CURRENT_VERSION,
                assemblies: BTreeMap::new(),
            });
        }

        let text = fs::read_to_string(&self.path)?;
        let probe: VersionProbe = serde_json::from_str(&text)?;

        match probe.version {
            CURRENT_VERSION => Ok(serde_json::from_str(&text)?),
            1 => {
                info!(
                    "Converting legacy two-point calibration document '{}'",
                    self.path.display()
                );
                let legacy: LegacyDocument = serde_json::from_str(&text)?;
                convert_legacy(legacy)
            }
            other => Err(ThermoError::Persistence(format!(
                "unsupported calibration schema version {other} in '{}'",
                self.path.display()
            ))),
        }
    }

    fn write_document(&self, document: &PolynomialDocument) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

fn convert_legacy(legacy: LegacyDocument) -> AppResult<PolynomialDocument> {
    let mut assemblies = BTreeMap::new();
    for (id, channels) in legacy.assemblies {
        let mut converted = BTreeMap::new();
        for (name, entry) in channels {
            let cal = SensorCalibration::from_two_point(
                entry.raw_low,
                entry.ref_low,
                entry.raw_high,
                entry.ref_high,
            )
            .map_err(|e| {
                ThermoError::Persistence(format!(
                    "legacy calibration for assembly {id} channel {name}: {e}"
                ))
            })?;
            converted.insert(name, cal.coefficients().to_vec());
        }
        assemblies.insert(id, converted);
    }
    Ok(PolynomialDocument {
        version: CURRENT_VERSION,
        assemblies,
    })
}

impl CalibrationStore for JsonFileStore {
    fn load(&self, assembly_id: u32) -> AppResult<SensorAssembly> {
        let document = self.read_document()?;
        let mut assembly = SensorAssembly::new(assembly_id);

        let Some(channels) = document.assemblies.get(&assembly_id) else {
            info!("No stored calibration for assembly {assembly_id}; using identity");
            return Ok(assembly);
        };

        for (name, coefficients) in channels {
            if coefficients.is_empty() {
                // An empty list means "never calibrated" in old editor saves.
                warn!("Empty coefficient list for assembly {assembly_id} channel {name}; keeping identity");
                continue;
            }
            let cal = SensorCalibration::new(coefficients.clone())?;
            assembly.set_calibration_by_name(name, cal)?;
        }

        Ok(assembly)
    }

    fn save(&self, assembly: &SensorAssembly) -> AppResult<()> {
        let mut document = self.read_document()?;
        document.version = CURRENT_VERSION;

        let channels = Channel::ALL
            .iter()
            .map(|&ch| {
                (
                    ch.name().to_string(),
                    assembly.calibration(ch).coefficients().to_vec(),
                )
            })
            .collect();

        document.assemblies.insert(assembly.id(), channels);
        self.write_document(&document)?;
        info!(
            "Saved calibration for assembly {} to '{}'",
            assembly.id(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("calibration.json"))
    }

    #[test]
    fn test_missing_file_loads_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let assembly = store.load(1).unwrap();
        assert_eq!(assembly.evaluate(Channel::T4, 33.0), 33.0);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut assembly = SensorAssembly::new(3);
        assembly.set_calibration(
            Channel::T2,
            SensorCalibration::new(vec![1.05, -0.4]).unwrap(),
        );
        store.save(&assembly).unwrap();

        let loaded = store.load(3).unwrap();
        assert_eq!(loaded, assembly);
    }

    #[test]
    fn test_save_preserves_other_assemblies() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut first = SensorAssembly::new(1);
        first.set_calibration(Channel::T1, SensorCalibration::from_scalar(5.0).unwrap());
        store.save(&first).unwrap();
        store.save(&SensorAssembly::new(2)).unwrap();

        assert_eq!(store.load(1).unwrap(), first);
    }

    #[test]
    fn test_unknown_assembly_defaults_to_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&SensorAssembly::new(1)).unwrap();

        let other = store.load(6).unwrap();
        assert_eq!(other, SensorAssembly::new(6));
    }

    #[test]
    fn test_legacy_two_point_document_converts_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        fs::write(
            &path,
            r#"{
                "version": 1,
                "assemblies": {
                    "1": {
                        "t1": {"raw_low": 39.5, "ref_low": 40.0, "raw_high": 63.5, "ref_high": 65.0}
                    }
                }
            }"#,
        )
        .unwrap();

        let store = JsonFileStore::new(&path);
        let assembly = store.load(1).unwrap();
        assert!((assembly.evaluate(Channel::T1, 50.0) - 50.9375).abs() < 1e-9);
        // Unlisted channels stay identity.
        assert_eq!(assembly.evaluate(Channel::T2, 50.0), 50.0);
    }

    #[test]
    fn test_unsupported_version_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        fs::write(&path, r#"{"version": 9, "assemblies": {}}"#).unwrap();

        let err = JsonFileStore::new(&path).load(1).unwrap_err();
        assert!(matches!(err, ThermoError::Persistence(_)));
    }

    #[test]
    fn test_unknown_channel_key_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        fs::write(
            &path,
            r#"{"version": 2, "assemblies": {"1": {"t9": [1.0, 0.0]}}}"#,
        )
        .unwrap();

        let err = JsonFileStore::new(&path).load(1).unwrap_err();
        assert!(matches!(err, ThermoError::ChannelNotFound(_)));
    }
}

//! Per-sensor calibration model.
//!
//! Each sensor channel carries a polynomial transform from raw sensor units
//! to reference units. Coefficients are stored highest-degree first, so
//! `[a, b, c]` means `a*x^2 + b*x + c`. The historical two-point linear
//! calibration is the degree-1 special case and is constructed through
//! [`SensorCalibration::from_two_point`].
//!
//! Evaluation is a pure function; the model performs no I/O. Coefficients
//! are replaced only by an explicit set operation and are otherwise
//! immutable.

pub mod store;

use serde::{Deserialize, Serialize};

use crate::core::{Channel, CHANNEL_COUNT};
use crate::error::{AppResult, ThermoError};

/// Calibration transform for a single sensor: a non-empty list of polynomial
/// coefficients, highest-degree term first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct SensorCalibration {
    coefficients: Vec<f64>,
}

impl SensorCalibration {
    /// The identity transform `y = x`.
    pub fn identity() -> Self {
        Self {
            coefficients: vec![1.0, 0.0],
        }
    }

    /// Build from an ordered coefficient list, highest-degree first.
    ///
    /// Rejects empty lists; no numerical-stability validation is performed
    /// beyond that (an all-zero high-order list is accepted as-is).
    pub fn new(coefficients: Vec<f64>) -> AppResult<Self> {
        if coefficients.is_empty() {
            return Err(ThermoError::CalibrationValidation(
                "coefficient list must not be empty".to_string(),
            ));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ThermoError::CalibrationValidation(
                "coefficients must be finite numbers".to_string(),
            ));
        }
        Ok(Self { coefficients })
    }

    /// A bare scalar is a degree-0 polynomial (constant output).
    pub fn from_scalar(value: f64) -> AppResult<Self> {
        Self::new(vec![value])
    }

    /// Build the linear transform through two (raw, reference) points.
    ///
    /// A degenerate raw range is a configuration error here, at save time,
    /// never deferred to evaluation.
    pub fn from_two_point(
        raw_low: f64,
        ref_low: f64,
        raw_high: f64,
        ref_high: f64,
    ) -> AppResult<Self> {
        if raw_high == raw_low {
            return Err(ThermoError::CalibrationValidation(format!(
                "degenerate two-point range: raw_low == raw_high == {raw_low}"
            )));
        }
        let slope = (ref_high - ref_low) / (raw_high - raw_low);
        Self::new(vec![slope, ref_low - raw_low * slope])
    }

    /// Evaluate the polynomial at `raw` (Horner form).
    pub fn evaluate(&self, raw: f64) -> f64 {
        self.coefficients
            .iter()
            .fold(0.0, |acc, &coeff| acc * raw + coeff)
    }

    /// Ordered coefficients, highest-degree first. Never empty.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<Vec<f64>> for SensorCalibration {
    type Error = ThermoError;

    fn try_from(coefficients: Vec<f64>) -> AppResult<Self> {
        Self::new(coefficients)
    }
}

impl From<SensorCalibration> for Vec<f64> {
    fn from(cal: SensorCalibration) -> Self {
        cal.coefficients
    }
}

/// One assembly of six calibrated sensors.
///
/// Owned exclusively by the reading pipeline for the duration of a
/// connection and replaced wholesale (never mutated concurrently) when the
/// user switches assemblies or saves an edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorAssembly {
    id: u32,
    sensors: [SensorCalibration; CHANNEL_COUNT],
}

impl SensorAssembly {
    /// Create an assembly with identity calibration on every channel.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            sensors: std::array::from_fn(|_| SensorCalibration::identity()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Replace one channel's transform.
    pub fn set_calibration(&mut self, channel: Channel, calibration: SensorCalibration) {
        self.sensors[channel.index()] = calibration;
    }

    /// String-keyed entry point for the editor/store boundary; the only
    /// place an unknown channel name can surface.
    pub fn set_calibration_by_name(
        &mut self,
        name: &str,
        calibration: SensorCalibration,
    ) -> AppResult<()> {
        let channel = Channel::from_name(name)?;
        self.set_calibration(channel, calibration);
        Ok(())
    }

    /// Read accessor, used by the editor and the CSV logger to record the
    /// calibration in effect.
    pub fn calibration(&self, channel: Channel) -> &SensorCalibration {
        &self.sensors[channel.index()]
    }

    /// Convert a raw sensor value to reference units.
    pub fn evaluate(&self, channel: Channel, raw: f64) -> f64 {
        self.sensors[channel.index()].evaluate(raw)
    }
}

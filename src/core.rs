//! Core data types for the acquisition pipeline.
//!
//! This module defines the vocabulary shared by every stage of the system:
//! the closed set of sensor channels, the raw and averaged sample shapes, the
//! finished [`Reading`] delivered to consumers, and the event types crossing
//! the worker/consumer boundary.
//!
//! # Data Flow
//!
//! ```text
//! bytes --> line --> DeviceMessage --> RawFrame --> AveragedSample --> Reading
//!                        |
//!                        +--> LogMessage (status / error text)
//! ```
//!
//! Data flows strictly one direction. Calibration coefficients flow the other
//! way, from the store into the [`SensorAssembly`](crate::calibration::SensorAssembly),
//! only at connect time or on an explicit save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

use crate::error::{AppResult, ThermoError};

/// Number of sensor channels in an assembly (the reference channel is extra).
pub const CHANNEL_COUNT: usize = 6;

/// One of the six fixed sensor channels of an assembly.
///
/// The wire protocol and the calibration store key sensors by the names
/// `"t1"`..`"t6"`. Using a closed enum instead of string keys removes the
/// unknown-channel failure mode from every lookup except the single string
/// entry point, [`Channel::from_name`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::T1,
        Channel::T2,
        Channel::T3,
        Channel::T4,
        Channel::T5,
        Channel::T6,
    ];

    /// Zero-based positional index (T1 = 0), matching the wire array order.
    pub fn index(self) -> usize {
        match self {
            Channel::T1 => 0,
            Channel::T2 => 1,
            Channel::T3 => 2,
            Channel::T4 => 3,
            Channel::T5 => 4,
            Channel::T6 => 5,
        }
    }

    /// The store/wire key for this channel (`"t1"`..`"t6"`).
    pub fn name(self) -> &'static str {
        match self {
            Channel::T1 => "t1",
            Channel::T2 => "t2",
            Channel::T3 => "t3",
            Channel::T4 => "t4",
            Channel::T5 => "t5",
            Channel::T6 => "t6",
        }
    }

    /// Resolve a store/UI key. Unknown names are a logic-bug class error,
    /// distinct from the recoverable link errors.
    pub fn from_name(name: &str) -> AppResult<Channel> {
        match name {
            "t1" => Ok(Channel::T1),
            "t2" => Ok(Channel::T2),
            "t3" => Ok(Channel::T3),
            "t4" => Ok(Channel::T4),
            "t5" => Ok(Channel::T5),
            "t6" => Ok(Channel::T6),
            other => Err(ThermoError::ChannelNotFound(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One complete multi-channel sample as decoded from a single wire line.
///
/// Transient: frames are consumed by the averaging buffer and not retained.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    /// Raw sensor values in channel order.
    pub temps: [f64; CHANNEL_COUNT],
    /// Reference probe value, present only when the device reports it.
    pub reference: Option<f64>,
}

/// Mean of one averaging batch, still in raw sensor units.
#[derive(Clone, Debug, PartialEq)]
pub struct AveragedSample {
    /// Per-channel means over each channel's current window contents.
    pub temps: [f64; CHANNEL_COUNT],
    /// Reference mean, `None` while the reference window is empty.
    pub reference: Option<f64>,
}

/// One fully processed, optionally calibrated, multi-channel reading.
///
/// This is the unit delivered to presentation and logging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// UTC timestamp at emission.
    pub timestamp: DateTime<Utc>,
    /// Averaged raw values in channel order.
    pub raw: [f64; CHANNEL_COUNT],
    /// Calibrated values; equal to `raw` when calibration is disabled.
    pub values: [f64; CHANNEL_COUNT],
    /// Reference value, passed through uncalibrated.
    pub reference: Option<f64>,
    /// Whether calibration was applied to `values`.
    pub calibrated: bool,
}

/// A timestamped line on the log-message stream.
///
/// Carries device status text, malformed-line reports and link failures,
/// unmodified, for display by the consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl LogMessage {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

/// Events delivered from the reader thread to the pipeline.
///
/// Delivery order matches wire arrival order; no event is delivered twice.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    /// A successfully decoded wire line.
    Message(crate::protocol::DeviceMessage),
    /// A line that failed to decode. Recoverable; the link stays up.
    Malformed { line: String, error: String },
    /// A hard I/O error. The reader loop exits after emitting this.
    LinkFailed(String),
}

/// Lifecycle state of the serial link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Byte-level transport beneath the link manager.
///
/// The reader thread performs blocking reads bounded by the transport's own
/// poll timeout. Implementations must return `Ok(0)` when the timeout elapsed
/// with no data (a poll, not an error) and map internal timeout errors to the
/// same contract; any other `Err` is treated as a fatal link failure.
pub trait LinkTransport: Send {
    /// Read available bytes into `buf`, blocking at most the poll interval.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf` to the device.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        for ch in Channel::ALL {
            assert_eq!(Channel::from_name(ch.name()).unwrap(), ch);
        }
    }

    #[test]
    fn test_channel_index_matches_wire_order() {
        for (i, ch) in Channel::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
    }

    #[test]
    fn test_unknown_channel_is_channel_not_found() {
        let err = Channel::from_name("t7").unwrap_err();
        assert!(matches!(err, ThermoError::ChannelNotFound(name) if name == "t7"));
    }
}

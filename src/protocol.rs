//! Wire message decoding.
//!
//! The instrument emits one message per line. Two formats exist across device
//! firmware revisions:
//!
//! - **Line-delimited JSON** (canonical): either a data object
//!   `{"temps": [t1, t2, t3, t4, t5, t6, ref?]}` with six sensor values plus
//!   an optional trailing reference value in fixed positional order, or a
//!   status object `{"type": "...", "message": "..."}`.
//! - **Legacy delimited text** (historical fallback): a line of the form
//!   `T1 <v> | T2 <v> | ... | Ref <v>`. A line with no `" | "` delimiter is
//!   device status text, not an error.
//!
//! A line that fails to decode under the selected format is a recoverable
//! decode error; the caller reports it and keeps reading.

use serde::Deserialize;

use crate::core::{RawFrame, CHANNEL_COUNT};

/// Wire format in effect for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// One JSON object per line (current firmware).
    Json,
    /// `" | "`-delimited `NAME value` tokens (legacy firmware).
    #[serde(rename = "legacy")]
    LegacyDelimited,
}

impl Default for WireFormat {
    fn default() -> Self {
        WireFormat::Json
    }
}

/// A decoded wire line.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceMessage {
    /// A data frame naming all six sensor values (plus optional reference).
    Temps(RawFrame),
    /// A device status/log line, forwarded unmodified.
    Log { kind: String, message: String },
}

/// JSON wire shapes. Untagged: a line is either a data object or a status
/// object, distinguished by its fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonLine {
    Temps {
        temps: Vec<f64>,
    },
    Log {
        #[serde(rename = "type")]
        kind: String,
        message: String,
    },
}

/// Decode one whitespace-trimmed line under the given format.
///
/// Returns `Err` with a human-readable reason for undecodable lines; the
/// link manager reports these as malformed-line events rather than failing
/// the connection.
pub fn parse_line(line: &str, format: WireFormat) -> Result<DeviceMessage, String> {
    match format {
        WireFormat::Json => parse_json_line(line),
        WireFormat::LegacyDelimited => parse_legacy_line(line),
    }
}

fn parse_json_line(line: &str) -> Result<DeviceMessage, String> {
    let parsed: JsonLine =
        serde_json::from_str(line).map_err(|e| format!("JSON decode error: {e}"))?;

    match parsed {
        JsonLine::Temps { temps } => {
            if temps.len() < CHANNEL_COUNT || temps.len() > CHANNEL_COUNT + 1 {
                return Err(format!(
                    "expected {} or {} temperature values, got {}",
                    CHANNEL_COUNT,
                    CHANNEL_COUNT + 1,
                    temps.len()
                ));
            }
            let mut sensors = [0.0; CHANNEL_COUNT];
            sensors.copy_from_slice(&temps[..CHANNEL_COUNT]);
            let reference = temps.get(CHANNEL_COUNT).copied();
            Ok(DeviceMessage::Temps(RawFrame {
                temps: sensors,
                reference,
            }))
        }
        JsonLine::Log { kind, message } => Ok(DeviceMessage::Log { kind, message }),
    }
}

fn parse_legacy_line(line: &str) -> Result<DeviceMessage, String> {
    // Bare lines without the token delimiter are device status text.
    if !line.contains(" | ") {
        return Ok(DeviceMessage::Log {
            kind: "status".to_string(),
            message: line.to_string(),
        });
    }

    let mut sensors = [f64::NAN; CHANNEL_COUNT];
    let mut seen = [false; CHANNEL_COUNT];
    let mut reference = None;

    for token in line.split(" | ") {
        let mut parts = token.split_whitespace();
        let name = parts.next().ok_or_else(|| "empty token".to_string())?;
        let value: f64 = parts
            .next()
            .ok_or_else(|| format!("token '{name}' has no value"))?
            .parse()
            .map_err(|e| format!("token '{name}': {e}"))?;

        match name {
            "T1" => (sensors[0], seen[0]) = (value, true),
            "T2" => (sensors[1], seen[1]) = (value, true),
            "T3" => (sensors[2], seen[2]) = (value, true),
            "T4" => (sensors[3], seen[3]) = (value, true),
            "T5" => (sensors[4], seen[4]) = (value, true),
            "T6" => (sensors[5], seen[5]) = (value, true),
            "Ref" => reference = Some(value),
            other => return Err(format!("unknown token name '{other}'")),
        }
    }

    if !seen.iter().all(|&s| s) {
        return Err("data line did not name all six sensor channels".to_string());
    }

    Ok(DeviceMessage::Temps(RawFrame {
        temps: sensors,
        reference,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_temps_with_reference() {
        let msg = parse_line(r#"{"temps":[1,2,3,4,5,6,7]}"#, WireFormat::Json).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Temps(RawFrame {
                temps: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
                reference: Some(7.0),
            })
        );
    }

    #[test]
    fn test_json_temps_without_reference() {
        let msg = parse_line(r#"{"temps":[1,2,3,4,5,6]}"#, WireFormat::Json).unwrap();
        match msg {
            DeviceMessage::Temps(frame) => assert_eq!(frame.reference, None),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_json_log_message() {
        let msg = parse_line(
            r#"{"type":"info","message":"heater ready"}"#,
            WireFormat::Json,
        )
        .unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Log {
                kind: "info".to_string(),
                message: "heater ready".to_string(),
            }
        );
    }

    #[test]
    fn test_json_garbage_is_decode_error() {
        assert!(parse_line("garbage", WireFormat::Json).is_err());
    }

    #[test]
    fn test_json_wrong_arity_is_decode_error() {
        assert!(parse_line(r#"{"temps":[1,2,3]}"#, WireFormat::Json).is_err());
        assert!(parse_line(r#"{"temps":[1,2,3,4,5,6,7,8]}"#, WireFormat::Json).is_err());
    }

    #[test]
    fn test_legacy_data_line() {
        let line = "T1 21.5 | T2 22.0 | T3 22.5 | T4 23.0 | T5 23.5 | T6 24.0 | Ref 25.0";
        let msg = parse_line(line, WireFormat::LegacyDelimited).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Temps(RawFrame {
                temps: [21.5, 22.0, 22.5, 23.0, 23.5, 24.0],
                reference: Some(25.0),
            })
        );
    }

    #[test]
    fn test_legacy_status_line() {
        let msg = parse_line("Heater initialized", WireFormat::LegacyDelimited).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Log {
                kind: "status".to_string(),
                message: "Heater initialized".to_string(),
            }
        );
    }

    #[test]
    fn test_legacy_incomplete_line_is_error() {
        assert!(parse_line("T1 21.5 | T2 22.0", WireFormat::LegacyDelimited).is_err());
    }

    #[test]
    fn test_legacy_bad_value_is_error() {
        let line = "T1 hot | T2 22.0 | T3 22.5 | T4 23.0 | T5 23.5 | T6 24.0";
        assert!(parse_line(line, WireFormat::LegacyDelimited).is_err());
    }
}

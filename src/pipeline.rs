//! The reading pipeline: link events in, finished readings out.
//!
//! Glues the link manager, averaging buffer and calibration model into the
//! single per-line transformation:
//!
//! ```text
//! LinkEvent --> averaging --> calibration --> Reading stream
//!       \--> LogMessage stream (status text, malformed lines, link failures)
//! ```
//!
//! The pipeline owns the active [`SensorAssembly`] for the duration of a
//! connection; assembly switches and calibration edits replace it wholesale
//! via [`ReadingPipeline::set_assembly`], never mutate it in place. Both
//! outbound streams are unbounded channels the presentation layer drains on
//! its own tick; the pipeline never calls into consumers.

use chrono::Utc;
use log::warn;
use tokio::sync::mpsc;

use crate::averaging::AveragingBuffer;
use crate::calibration::SensorAssembly;
use crate::core::{Channel, LinkEvent, LogMessage, RawFrame, Reading};
use crate::protocol::DeviceMessage;

/// Consumer-facing switches for the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Samples averaged per emitted reading.
    pub batch_size: usize,
    /// Apply the assembly's calibration to emitted values.
    pub calibration_enabled: bool,
    /// Surface the reference probe on emitted readings.
    pub reference_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            calibration_enabled: false,
            reference_enabled: false,
        }
    }
}

/// Composition root of the acquisition path; see module docs.
pub struct ReadingPipeline {
    assembly: SensorAssembly,
    buffer: AveragingBuffer,
    calibration_enabled: bool,
    reference_enabled: bool,
    readings_tx: mpsc::UnboundedSender<Reading>,
    log_tx: mpsc::UnboundedSender<LogMessage>,
}

impl ReadingPipeline {
    /// Build a pipeline plus its two outbound streams.
    pub fn new(
        assembly: SensorAssembly,
        config: PipelineConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Reading>,
        mpsc::UnboundedReceiver<LogMessage>,
    ) {
        let (readings_tx, readings_rx) = mpsc::unbounded_channel();
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        (
            Self {
                assembly,
                buffer: AveragingBuffer::new(config.batch_size),
                calibration_enabled: config.calibration_enabled,
                reference_enabled: config.reference_enabled,
                readings_tx,
                log_tx,
            },
            readings_rx,
            log_rx,
        )
    }

    /// Calibration set currently in effect (e.g. for the CSV logger).
    pub fn assembly(&self) -> &SensorAssembly {
        &self.assembly
    }

    /// Replace the calibration set wholesale (assembly switch or saved edit).
    pub fn set_assembly(&mut self, assembly: SensorAssembly) {
        self.assembly = assembly;
    }

    pub fn calibration_enabled(&self) -> bool {
        self.calibration_enabled
    }

    pub fn set_calibration_enabled(&mut self, enabled: bool) {
        self.calibration_enabled = enabled;
    }

    pub fn set_reference_enabled(&mut self, enabled: bool) {
        self.reference_enabled = enabled;
    }

    /// Feed one link event through the pipeline.
    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Message(DeviceMessage::Temps(frame)) => {
                self.process_frame(&frame);
            }
            LinkEvent::Message(DeviceMessage::Log { kind, message }) => {
                self.log(format!("{kind}: {message}"));
            }
            LinkEvent::Malformed { line, error } => {
                self.log(format!("Malformed message ({error}): {line}"));
            }
            LinkEvent::LinkFailed(reason) => {
                self.log(reason);
            }
        }
    }

    /// Drain loop for a dedicated consumer thread; returns when the link
    /// side closes the event channel.
    pub fn run(mut self, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = events.blocking_recv() {
            self.handle_event(event);
        }
    }

    fn process_frame(&mut self, frame: &RawFrame) {
        self.buffer.push_frame(frame);
        let Some(sample) = self.buffer.tick() else {
            return;
        };

        let mut values = sample.temps;
        if self.calibration_enabled {
            for ch in Channel::ALL {
                values[ch.index()] = self.assembly.evaluate(ch, sample.temps[ch.index()]);
            }
        }

        // The reference probe is passed through uncalibrated and stays
        // outside the six-point spatial dataset.
        let reference = if self.reference_enabled {
            sample.reference
        } else {
            None
        };

        let reading = Reading {
            timestamp: Utc::now(),
            raw: sample.temps,
            values,
            reference,
            calibrated: self.calibration_enabled,
        };
        if self.readings_tx.send(reading).is_err() {
            warn!("Reading receiver dropped; discarding sample");
        }
    }

    fn log(&self, text: String) {
        let _ = self.log_tx.send(LogMessage::now(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::SensorCalibration;
    use crate::protocol::parse_line;
    use crate::protocol::WireFormat;

    fn data_event(line: &str) -> LinkEvent {
        LinkEvent::Message(parse_line(line, WireFormat::Json).unwrap())
    }

    fn pipeline(
        config: PipelineConfig,
    ) -> (
        ReadingPipeline,
        mpsc::UnboundedReceiver<Reading>,
        mpsc::UnboundedReceiver<LogMessage>,
    ) {
        ReadingPipeline::new(SensorAssembly::new(1), config)
    }

    #[test]
    fn test_raw_passthrough_with_calibration_disabled() {
        let (mut pipeline, mut readings, _logs) = pipeline(PipelineConfig {
            batch_size: 1,
            calibration_enabled: false,
            reference_enabled: true,
        });

        pipeline.handle_event(data_event(r#"{"temps":[1,2,3,4,5,6,7]}"#));

        let reading = readings.try_recv().unwrap();
        assert_eq!(reading.values, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(reading.reference, Some(7.0));
        assert!(!reading.calibrated);
    }

    #[test]
    fn test_reference_absent_when_disabled() {
        let (mut pipeline, mut readings, _logs) = pipeline(PipelineConfig {
            batch_size: 1,
            calibration_enabled: false,
            reference_enabled: false,
        });

        pipeline.handle_event(data_event(r#"{"temps":[1,2,3,4,5,6,7]}"#));
        assert_eq!(readings.try_recv().unwrap().reference, None);
    }

    #[test]
    fn test_calibration_applied_per_channel() {
        let mut assembly = SensorAssembly::new(1);
        assembly.set_calibration(
            Channel::T1,
            SensorCalibration::new(vec![2.0, 1.0]).unwrap(),
        );
        let (mut pipeline, mut readings, _logs) = ReadingPipeline::new(
            assembly,
            PipelineConfig {
                batch_size: 1,
                calibration_enabled: true,
                reference_enabled: true,
            },
        );

        pipeline.handle_event(data_event(r#"{"temps":[10,20,30,40,50,60,70]}"#));

        let reading = readings.try_recv().unwrap();
        assert_eq!(reading.raw[0], 10.0);
        assert_eq!(reading.values[0], 21.0);
        // Identity channels unchanged; reference never calibrated.
        assert_eq!(reading.values[1], 20.0);
        assert_eq!(reading.reference, Some(70.0));
        assert!(reading.calibrated);
    }

    #[test]
    fn test_batching_emits_every_third_frame() {
        let (mut pipeline, mut readings, _logs) = pipeline(PipelineConfig {
            batch_size: 3,
            ..PipelineConfig::default()
        });

        pipeline.handle_event(data_event(r#"{"temps":[10,10,10,10,10,10]}"#));
        pipeline.handle_event(data_event(r#"{"temps":[20,20,20,20,20,20]}"#));
        assert!(readings.try_recv().is_err());

        pipeline.handle_event(data_event(r#"{"temps":[30,30,30,30,30,30]}"#));
        let reading = readings.try_recv().unwrap();
        assert!((reading.values[0] - 20.0).abs() < 1e-12);
        assert!(readings.try_recv().is_err());
    }

    #[test]
    fn test_device_log_message_goes_to_log_stream() {
        let (mut pipeline, mut readings, mut logs) = pipeline(PipelineConfig::default());

        pipeline.handle_event(data_event(r#"{"type":"warn","message":"fan stalled"}"#));

        assert_eq!(logs.try_recv().unwrap().text, "warn: fan stalled");
        assert!(readings.try_recv().is_err());
    }

    #[test]
    fn test_malformed_event_yields_one_log_and_no_reading() {
        let (mut pipeline, mut readings, mut logs) = pipeline(PipelineConfig::default());

        pipeline.handle_event(LinkEvent::Malformed {
            line: "garbage".to_string(),
            error: "JSON decode error: expected value".to_string(),
        });

        let log = logs.try_recv().unwrap();
        assert!(log.text.contains("garbage"));
        assert!(logs.try_recv().is_err());
        assert!(readings.try_recv().is_err());
    }

    #[test]
    fn test_calibration_toggle_applies_to_next_reading() {
        let mut assembly = SensorAssembly::new(1);
        assembly.set_calibration(
            Channel::T1,
            SensorCalibration::new(vec![2.0, 1.0]).unwrap(),
        );
        let (mut pipeline, mut readings, _logs) = ReadingPipeline::new(
            assembly,
            PipelineConfig {
                batch_size: 1,
                calibration_enabled: false,
                reference_enabled: false,
            },
        );

        pipeline.handle_event(data_event(r#"{"temps":[10,10,10,10,10,10]}"#));
        let reading = readings.try_recv().unwrap();
        assert_eq!(reading.values[0], 10.0);
        assert!(!reading.calibrated);

        assert!(!pipeline.calibration_enabled());
        pipeline.set_calibration_enabled(true);
        assert!(pipeline.calibration_enabled());

        pipeline.handle_event(data_event(r#"{"temps":[10,10,10,10,10,10]}"#));
        let reading = readings.try_recv().unwrap();
        assert_eq!(reading.values[0], 21.0);
        assert!(reading.calibrated);
    }

    #[test]
    fn test_reference_toggle_applies_to_next_reading() {
        let (mut pipeline, mut readings, _logs) = pipeline(PipelineConfig {
            batch_size: 1,
            calibration_enabled: false,
            reference_enabled: false,
        });

        pipeline.handle_event(data_event(r#"{"temps":[1,2,3,4,5,6,7]}"#));
        assert_eq!(readings.try_recv().unwrap().reference, None);

        pipeline.set_reference_enabled(true);
        pipeline.handle_event(data_event(r#"{"temps":[1,2,3,4,5,6,7]}"#));
        assert_eq!(readings.try_recv().unwrap().reference, Some(7.0));

        pipeline.set_reference_enabled(false);
        pipeline.handle_event(data_event(r#"{"temps":[1,2,3,4,5,6,7]}"#));
        assert_eq!(readings.try_recv().unwrap().reference, None);
    }

    #[test]
    fn test_assembly_swap_takes_effect_immediately() {
        let (mut pipeline, mut readings, _logs) = pipeline(PipelineConfig {
            batch_size: 1,
            calibration_enabled: true,
            reference_enabled: false,
        });

        pipeline.handle_event(data_event(r#"{"temps":[5,5,5,5,5,5]}"#));
        assert_eq!(readings.try_recv().unwrap().values[0], 5.0);

        let mut replacement = SensorAssembly::new(2);
        replacement.set_calibration(
            Channel::T1,
            SensorCalibration::from_scalar(99.0).unwrap(),
        );
        pipeline.set_assembly(replacement);

        pipeline.handle_event(data_event(r#"{"temps":[5,5,5,5,5,5]}"#));
        assert_eq!(readings.try_recv().unwrap().values[0], 99.0);
    }
}

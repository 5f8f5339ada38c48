//! Headless acquisition front end.
//!
//! Connects to the instrument (or the built-in mock device), drives the
//! reading pipeline and prints finished readings until interrupted. The
//! GUI-free mode covers bench bring-up, soak tests and log capture.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use rand::{Rng, SeedableRng};
use std::time::Duration;

use thermodaq::calibration::store::{CalibrationStore, JsonFileStore};
use thermodaq::config::Settings;
use thermodaq::core::{Channel, Reading};
use thermodaq::link::mock::MockTransport;
use thermodaq::link::SerialLinkManager;
use thermodaq::pipeline::{PipelineConfig, ReadingPipeline};
use thermodaq::storage::ReadingLogger;

#[derive(Debug, Parser)]
#[command(name = "thermodaq", about = "Six-channel slide temperature acquisition")]
struct Cli {
    /// Config file (TOML). Defaults to ./thermodaq.toml when present.
    #[arg(long)]
    config: Option<String>,

    /// Serial port path, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long)]
    port: Option<String>,

    /// Baud rate override.
    #[arg(long)]
    baud: Option<u32>,

    /// Sensor assembly id whose calibration set to load.
    #[arg(long)]
    assembly: Option<u32>,

    /// Run against a simulated instrument instead of a serial port.
    #[arg(long)]
    mock: bool,

    /// Apply the stored calibration to displayed values.
    #[arg(long)]
    calibrate: bool,

    /// Enable the reference probe (sends REF ON after connecting).
    #[arg(long)]
    reference: bool,

    /// Write a CSV session log.
    #[arg(long)]
    log_csv: bool,
}

fn format_reading(reading: &Reading) -> String {
    let mut parts: Vec<String> = Channel::ALL
        .iter()
        .map(|ch| format!("{} {:6.2}", ch.name(), reading.values[ch.index()]))
        .collect();
    if let Some(reference) = reading.reference {
        parts.push(format!("ref {reference:6.2}"));
    }
    parts.join("  ")
}

/// Simulated firmware: six slide channels settling around 37 C plus a
/// reference probe, one JSON frame per interval.
fn mock_transport(interval: Duration) -> MockTransport {
    let mut rng = rand::rngs::StdRng::from_entropy();
    MockTransport::generator(interval, move || {
        let temps: Vec<String> = (0..7)
            .map(|i| {
                let base = 37.0 + i as f64 * 0.2;
                format!("{:.3}", base + rng.gen_range(-0.15..0.15))
            })
            .collect();
        format!(r#"{{"temps":[{}]}}"#, temps.join(","))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut settings =
        Settings::new(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        settings.serial.port = Some(port);
    }
    if let Some(baud) = cli.baud {
        settings.serial.baud_rate = baud;
    }
    if let Some(assembly) = cli.assembly {
        settings.acquisition.assembly_id = assembly;
    }
    if cli.calibrate {
        settings.acquisition.calibration_enabled = true;
    }
    if cli.reference {
        settings.acquisition.reference_enabled = true;
    }
    if cli.log_csv {
        settings.storage.log_on_start = true;
    }

    let store = JsonFileStore::new(&settings.calibration.store_path);
    let assembly = store
        .load(settings.acquisition.assembly_id)
        .context("Failed to load calibration store")?;
    info!(
        "Assembly {} loaded (calibration {})",
        assembly.id(),
        if settings.acquisition.calibration_enabled {
            "on"
        } else {
            "off"
        }
    );

    let (mut pipeline, mut readings_rx, mut app_log_rx) = ReadingPipeline::new(
        assembly,
        PipelineConfig {
            batch_size: settings.acquisition.batch_size,
            calibration_enabled: settings.acquisition.calibration_enabled,
            reference_enabled: settings.acquisition.reference_enabled,
        },
    );

    let link_config = settings.link_config();
    let poll_interval = link_config.poll_interval;
    let (mut link, mut events_rx) = SerialLinkManager::new(link_config);

    if cli.mock {
        info!("Starting mock instrument");
        link.start_with_transport(Box::new(mock_transport(poll_interval)))?;
    } else {
        link.start().context("Failed to open serial port")?;
    }

    link.send_line(if settings.acquisition.reference_enabled {
        "REF ON"
    } else {
        "REF OFF"
    })?;

    let mut logger = settings
        .storage
        .log_on_start
        .then(|| ReadingLogger::new(&settings.storage.default_path));

    info!("Acquiring; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                pipeline.handle_event(event);
            }
            reading = readings_rx.recv() => {
                let Some(reading) = reading else { break };
                info!("{}", format_reading(&reading));
                if let Some(logger) = logger.as_mut() {
                    if let Err(e) = logger.log(&reading, pipeline.assembly()) {
                        error!("Session log write failed: {e}");
                    }
                }
            }
            message = app_log_rx.recv() => {
                let Some(message) = message else { break };
                info!("device: {}", message.text);
            }
        }
    }

    if let Some(mut logger) = logger {
        logger.close()?;
    }
    link.stop()?;
    Ok(())
}

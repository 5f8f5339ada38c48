//! Serial link lifecycle and the background reader thread.
//!
//! [`SerialLinkManager`] owns the open port handle and the single reader
//! thread of an active connection. The reader performs blocking reads
//! bounded by a short poll interval, accumulates bytes into lines, decodes
//! each line under the configured wire format and delivers the result as a
//! [`LinkEvent`] over an unbounded channel. Events arrive in wire order and
//! are never duplicated.
//!
//! # State machine
//!
//! ```text
//! Disconnected --start--> Connecting --open ok--> Connected
//! Connected --stop / fatal read error--> Disconnected
//! ```
//!
//! `start` while already connected fails with `AlreadyRunning` and leaves
//! the existing connection untouched; callers must `stop` first. `stop` is
//! idempotent, signals the reader, bounded-waits for it to exit and only
//! then releases the port handle. A reader that fails to exit within the
//! bound surfaces as a distinct [`ThermoError::ShutdownTimeout`] instead of
//! the port being closed underneath it.

pub mod mock;
pub mod serial;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::core::{ConnectionState, LinkEvent, LinkTransport};
use crate::error::{AppResult, ThermoError};
use crate::protocol::{self, WireFormat};

/// Connection parameters for one serial link.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Port path (e.g. "/dev/ttyUSB0", "COM3"). `None` until selected.
    pub port_name: Option<String>,
    /// Baud rate (e.g. 9600, 115200).
    pub baud_rate: u32,
    /// Window after which a stale partial line is discarded.
    pub read_timeout: Duration,
    /// Poll interval of the blocking read; bounds stop latency.
    pub poll_interval: Duration,
    /// Bounded wait for the reader thread on `stop`.
    pub join_timeout: Duration,
    /// Wire format in effect for the connection.
    pub wire_format: WireFormat,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: 9600,
            read_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(5),
            wire_format: WireFormat::Json,
        }
    }
}

/// Handles owned while a reader thread is (or was) running.
struct Worker {
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
    done_rx: std_mpsc::Receiver<()>,
    transport: Arc<Mutex<Box<dyn LinkTransport>>>,
}

/// Owns the serial connection lifecycle; see module docs.
pub struct SerialLinkManager {
    config: LinkConfig,
    state: ConnectionState,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    worker: Option<Worker>,
}

impl SerialLinkManager {
    /// Create a manager and the event stream its reader will feed.
    pub fn new(config: LinkConfig) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                state: ConnectionState::Disconnected,
                events_tx,
                worker: None,
            },
            events_rx,
        )
    }

    /// Current lifecycle state. A reader that exited on a fatal error reads
    /// as `Disconnected` here.
    pub fn state(&self) -> ConnectionState {
        if let (ConnectionState::Connected, Some(worker)) = (&self.state, &self.worker) {
            if !worker.alive.load(Ordering::Acquire) {
                return ConnectionState::Disconnected;
            }
        }
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the configured port and start the reader loop.
    ///
    /// Fails with `AlreadyRunning` when connected (the existing connection
    /// is left untouched) and with a configuration error when no port name
    /// has been set. On open failure the manager stays `Disconnected` and
    /// the caller must retry explicitly; there is no automatic reconnect.
    pub fn start(&mut self) -> AppResult<()> {
        if self.is_connected() {
            return Err(ThermoError::AlreadyRunning);
        }
        let Some(port_name) = self.config.port_name.clone() else {
            return Err(ThermoError::Configuration(
                "no serial port configured".to_string(),
            ));
        };

        self.state = ConnectionState::Connecting;
        let transport = match serial::open(
            &port_name,
            self.config.baud_rate,
            self.config.poll_interval,
        ) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = ConnectionState::Failed(e.to_string());
                return Err(e);
            }
        };
        info!(
            "Serial port '{}' opened at {} baud",
            port_name, self.config.baud_rate
        );
        self.spawn_reader(transport);
        Ok(())
    }

    /// Start the reader loop over an injected transport (tests, mock mode).
    pub fn start_with_transport(&mut self, transport: Box<dyn LinkTransport>) -> AppResult<()> {
        if self.is_connected() {
            return Err(ThermoError::AlreadyRunning);
        }
        self.spawn_reader(transport);
        Ok(())
    }

    fn spawn_reader(&mut self, transport: Box<dyn LinkTransport>) {
        // A previous worker can only be present here after it exited; drop
        // its handles before replacing it.
        if let Some(old) = self.worker.take() {
            let _ = old.handle.join();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = std_mpsc::channel();
        let transport = Arc::new(Mutex::new(transport));

        let reader = ReaderLoop {
            transport: Arc::clone(&transport),
            stop: Arc::clone(&stop),
            alive: Arc::clone(&alive),
            events: self.events_tx.clone(),
            wire_format: self.config.wire_format,
            read_timeout: self.config.read_timeout,
        };
        let handle = thread::spawn(move || {
            reader.run();
            let _ = done_tx.send(());
        });

        self.worker = Some(Worker {
            stop,
            alive,
            handle,
            done_rx,
            transport,
        });
        self.state = ConnectionState::Connected;
    }

    /// Signal the reader to exit, wait for it (bounded) and release the
    /// port. Safe to call when already stopped.
    pub fn stop(&mut self) -> AppResult<()> {
        let Some(worker) = self.worker.take() else {
            self.state = ConnectionState::Disconnected;
            return Ok(());
        };

        worker.stop.store(true, Ordering::Release);
        self.state = ConnectionState::Disconnected;

        match worker.done_rx.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                debug!("Reader thread joined; port released");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread still holds its transport clone; the port stays
                // open until it finally exits. Surface that instead of
                // pretending the shutdown was clean.
                warn!(
                    "Reader thread did not exit within {:?}",
                    self.config.join_timeout
                );
                Err(ThermoError::ShutdownTimeout)
            }
        }
    }

    /// Write one line (newline appended) to the device.
    ///
    /// Returns [`ThermoError::NotConnected`] when no link is up; commands
    /// are never silently dropped.
    pub fn send_line(&mut self, line: &str) -> AppResult<()> {
        let worker = self
            .worker
            .as_ref()
            .filter(|w| w.alive.load(Ordering::Acquire))
            .ok_or(ThermoError::NotConnected)?;

        let mut transport = worker
            .transport
            .lock()
            .map_err(|_| ThermoError::Connection("transport lock poisoned".to_string()))?;
        transport.write_all(format!("{line}\n").as_bytes())?;
        debug!("Sent serial command: {line}");
        Ok(())
    }
}

impl Drop for SerialLinkManager {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The background reader: one iteration per poll, one event per wire line.
struct ReaderLoop {
    transport: Arc<Mutex<Box<dyn LinkTransport>>>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<LinkEvent>,
    wire_format: WireFormat,
    read_timeout: Duration,
}

impl ReaderLoop {
    fn run(self) {
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = [0u8; 256];
        let mut last_data = Instant::now();

        while !self.stop.load(Ordering::Acquire) {
            // Hold the lock only for the read itself so send_line is never
            // starved for more than one poll interval.
            let read = match self.transport.lock() {
                Ok(mut transport) => transport.read(&mut buf),
                Err(_) => {
                    self.emit(LinkEvent::LinkFailed("transport lock poisoned".to_string()));
                    break;
                }
            };

            match read {
                Ok(0) => {
                    // Timeout poll, not an error. A partial line with no new
                    // data inside the read timeout is stale; drop it.
                    if !pending.is_empty() && last_data.elapsed() >= self.read_timeout {
                        debug!("Discarding stale partial line ({} bytes)", pending.len());
                        pending.clear();
                    }
                }
                Ok(n) => {
                    last_data = Instant::now();
                    pending.extend_from_slice(&buf[..n]);
                    self.drain_lines(&mut pending);
                }
                Err(e) if is_poll_timeout(&e) => {
                    if !pending.is_empty() && last_data.elapsed() >= self.read_timeout {
                        pending.clear();
                    }
                }
                Err(e) => {
                    self.emit(LinkEvent::LinkFailed(format!(
                        "Error reading from serial port: {e}"
                    )));
                    break;
                }
            }
        }

        self.alive.store(false, Ordering::Release);
    }

    fn drain_lines(&self, pending: &mut Vec<u8>) {
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if line.is_empty() {
                continue;
            }

            match protocol::parse_line(&line, self.wire_format) {
                Ok(message) => self.emit(LinkEvent::Message(message)),
                Err(error) => self.emit(LinkEvent::Malformed { line, error }),
            }
        }
    }

    fn emit(&self, event: LinkEvent) {
        // The receiver outlives the connection in normal operation; a closed
        // channel just means the consumer is gone and we are shutting down.
        let _ = self.events.send(event);
    }
}

fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

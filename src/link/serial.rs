//! Serial-port transport backed by the `serialport` crate.
//!
//! The port is opened with the reader's poll interval as its read timeout;
//! timeouts surface as `Ok(0)` per the [`LinkTransport`] contract so the
//! reader loop can treat them as polls rather than errors.

use std::time::Duration;

use crate::core::LinkTransport;
use crate::error::AppResult;

#[cfg(feature = "instrument_serial")]
mod enabled {
    use super::*;
    use crate::error::ThermoError;
    use std::io::{self, Read, Write};

    pub struct SerialTransport {
        port: Box<dyn serialport::SerialPort>,
    }

    impl LinkTransport for SerialTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(e),
            }
        }

        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            self.port.write_all(buf)?;
            self.port.flush()
        }
    }

    pub fn open(
        port_name: &str,
        baud_rate: u32,
        poll_interval: Duration,
    ) -> AppResult<Box<dyn LinkTransport>> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(poll_interval)
            .open()
            .map_err(|e| {
                ThermoError::Connection(format!("'{port_name}' at {baud_rate} baud: {e}"))
            })?;
        Ok(Box::new(SerialTransport { port }))
    }
}

#[cfg(feature = "instrument_serial")]
pub use enabled::open;

#[cfg(not(feature = "instrument_serial"))]
pub fn open(
    _port_name: &str,
    _baud_rate: u32,
    _poll_interval: Duration,
) -> AppResult<Box<dyn LinkTransport>> {
    Err(crate::error::ThermoError::FeatureNotEnabled(
        "instrument_serial".to_string(),
    ))
}

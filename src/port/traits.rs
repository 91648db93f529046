//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` lets real hardware and the mock be used
//! interchangeably; `Connector` is how an adapter gets opened in the first
//! place, so the open/close lifecycle can be exercised without a device.

use super::discovery::PortIdentifier;
use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default baud rate used by the test harness devices.
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Default read timeout. Kept short: it bounds how long a capture takes to
/// notice a stop request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration parameters for opening a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Read/write timeout.
    pub timeout: Duration,
}

impl PortConfiguration {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Trait for serial port I/O operations.
///
/// Reads are expected to honour the configured timeout and report "nothing
/// arrived" as `Ok(0)`, not as an error.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read, `0` on timeout.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Set the read/write timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Block until pending output has been transmitted.
    fn flush_output(&mut self) -> Result<(), PortError>;

    /// Get the current bytes available to read (if supported).
    ///
    /// Returns `None` if the operation is not supported or cannot be determined.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}

/// Opens adapters for a port identifier.
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Resolve `identifier` and open it with `config`.
    fn connect(
        &self,
        identifier: &PortIdentifier,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_configuration_new() {
        let config = PortConfiguration::new(115200, Duration::from_millis(20));
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, Duration::from_millis(20));
    }
}

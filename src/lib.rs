//! UART capture library.
//!
//! Records everything a serial device emits into a file while the caller runs
//! some other operation (flashing, rebooting, driving a test), then stops the
//! capture once that operation ends.
//!
//! # Modules
//!
//! - `port`: serial port abstraction, discovery, the shared handle and a mock
//! - `capture`: capture strategies, the chunk queue and capture sessions
//! - `uart`: the `Uart` facade, hardware-backed or disabled
//! - `coordinator`: run an operation under capture
//! - `config`: TOML configuration with environment overrides
//! - `logging`: tracing subscriber setup
//! - `error`: capture-level errors

pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod port;
pub mod uart;

pub use capture::{CaptureSession, CaptureStrategy, CaptureSummary, SessionId};
pub use coordinator::{CaptureResult, Coordinator};
pub use error::CaptureError;
pub use port::{
    MockConnector, MockSerialPort, PortConfiguration, PortError, PortIdentifier, SerialPortAdapter,
    SharedPort, SyncSerialPort, SystemConnector,
};
pub use uart::{build_uart, DisabledUart, HardwareUart, Uart};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};

//! Configuration module for uart-capture.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `UART_CAPTURE_CONFIG` environment variable (explicit path)
//! 2. `./uart-capture.toml` (current directory)
//! 3. `~/.config/uart-capture/config.toml` (or the platform equivalent)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `UART_CAPTURE_<SECTION>_<KEY>`:
//! - `UART_CAPTURE_SERIAL_PORT=/dev/ttyUSB0`
//! - `UART_CAPTURE_SERIAL_ENABLED=false`
//! - `UART_CAPTURE_CAPTURE_OUTPUT=uart_%Y%m%d%H%M%S.log`
//!
//! # Example
//!
//! ```rust,no_run
//! use uart_capture::config::ConfigLoader;
//!
//! # fn main() -> Result<(), uart_capture::config::ConfigError> {
//! let config = ConfigLoader::load()?.into_config();
//! println!("Baud rate: {}", config.serial.baud_rate);
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{CaptureConfig, Config, LogFormat, LoggingConfig, SerialConfig};

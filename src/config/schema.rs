//! Configuration schema definitions.
//!
//! Every section uses `#[serde(default)]`, so a file only needs the keys it
//! changes.

use super::error::{ConfigError, ConfigResult};
use crate::capture::{CaptureStrategy, DEFAULT_CHUNK_SIZE};
use crate::port::{PortIdentifier, DEFAULT_BAUD_RATE};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub serial: SerialConfig,
    /// Capture output configuration
    pub capture: CaptureConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the capture code cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be greater than 0"));
        }
        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::validation(
                "serial.timeout_ms",
                "must be greater than 0; a zero timeout makes stop wait for data",
            ));
        }
        if self.capture.chunk_size == 0 {
            return Err(ConfigError::validation("capture.chunk_size", "must be greater than 0"));
        }
        if self.capture.output.as_os_str().is_empty() {
            return Err(ConfigError::validation("capture.output", "must not be empty"));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Hardware capture on/off. Off selects the inert port.
    pub enabled: bool,
    /// Explicit device path (wins over `description`)
    pub port: Option<String>,
    /// Human-readable description to resolve against attached devices
    pub description: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds; bounds capture shutdown latency
    pub timeout_ms: u64,
    /// Port aliases for convenience
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            description: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 100,
            aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_alias(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The configured device, if any. `port` takes precedence.
    pub fn identifier(&self) -> Option<PortIdentifier> {
        if let Some(port) = &self.port {
            return Some(PortIdentifier::parse(&self.resolve_alias(port)));
        }
        self.description
            .as_ref()
            .map(|d| PortIdentifier::Description(d.clone()))
    }
}

/// Capture output configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// "direct" or "buffered"
    pub strategy: CaptureStrategy,
    /// Bytes requested per device read
    pub chunk_size: usize,
    /// Capture file. May contain strftime fields, e.g. `uart_%Y%m%d%H%M%S.log`
    pub output: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            strategy: CaptureStrategy::Direct,
            chunk_size: DEFAULT_CHUNK_SIZE,
            output: PathBuf::from("data.txt"),
        }
    }
}

impl CaptureConfig {
    /// The output path with any strftime fields expanded for `now`.
    ///
    /// A path containing an invalid field is used literally.
    pub fn output_path<Tz>(&self, now: &DateTime<Tz>) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let raw = self.output.to_string_lossy();
        if !raw.contains('%') || StrftimeItems::new(&raw).any(|item| item == Item::Error) {
            return self.output.clone();
        }
        PathBuf::from(now.format(&raw).to_string())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive: "trace", "debug", "info", "uart_capture=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Log file path (optional; stderr when unset)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.serial.enabled);
        assert_eq!(config.serial.baud_rate, 38400);
        assert_eq!(config.serial.timeout(), Duration::from_millis(100));
        assert_eq!(config.capture.chunk_size, 1024);
        assert_eq!(config.capture.strategy, CaptureStrategy::Direct);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .aliases
            .insert("dut".to_string(), "/dev/ttyUSB3".to_string());
        config.port = Some("dut".to_string());

        assert_eq!(config.resolve_alias("COM5"), "COM5");
        assert_eq!(
            config.identifier(),
            Some(PortIdentifier::Path("/dev/ttyUSB3".to_string()))
        );
    }

    #[test]
    fn test_description_identifier() {
        let config = SerialConfig {
            description: Some("CP2102".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.identifier(),
            Some(PortIdentifier::Description("CP2102".to_string()))
        );
        assert_eq!(SerialConfig::default().identifier(), None);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = Config::default();
        config.capture.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { key, .. }) if key == "capture.chunk_size"
        ));

        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_path_expansion() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let mut capture = CaptureConfig::default();
        assert_eq!(capture.output_path(&now), PathBuf::from("data.txt"));

        capture.output = PathBuf::from("logs/uart_%Y%m%d%H%M%S.log");
        assert_eq!(
            capture.output_path(&now),
            PathBuf::from("logs/uart_20240309140500.log")
        );

        capture.output = PathBuf::from("bad_%");
        assert_eq!(capture.output_path(&now), PathBuf::from("bad_%"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            description = "FT232R"
            baud_rate = 115200

            [capture]
            strategy = "buffered"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.description.as_deref(), Some("FT232R"));
        assert_eq!(config.capture.strategy, CaptureStrategy::Buffered);
        // Defaults should still work
        assert_eq!(config.capture.chunk_size, 1024);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[capture]"));
        assert!(toml_str.contains("strategy = \"direct\""));
    }
}

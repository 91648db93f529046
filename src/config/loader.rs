//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "UART_CAPTURE";

/// Config file name in the working directory
const CONFIG_FILE_NAME: &str = "uart-capture.toml";

/// Config file name inside the platform config directory
const APP_CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "UART_CAPTURE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `UART_CAPTURE_CONFIG` environment variable (explicit path)
    /// 2. `./uart-capture.toml` (current directory)
    /// 3. `<platform config dir>/uart-capture/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values. The result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Malformed environment overrides are ignored here.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if let Err(e) = apply_env_overrides(&mut config) {
            debug!("Ignoring environment override: {}", e);
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        debug!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Platform config directory for this tool, e.g. `~/.config/uart-capture`.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "uart-capture").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(APP_CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Loaded configuration from {}", path.display());
    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> Option<(String, String)> {
    let name = format!("{}_{}", ENV_PREFIX, key);
    std::env::var(&name).ok().map(|value| (name, value))
}

fn parse_env<T: FromStr>(name: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(name, format!("Invalid {}: {:?}", what, value)))
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse(name, format!("Invalid boolean: {:?}", value))),
    }
}

fn parse_log_format(name: &str, value: &str) -> ConfigResult<LogFormat> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        "compact" => Ok(LogFormat::Compact),
        _ => Err(ConfigError::env_parse(name, format!("Unknown log format: {:?}", value))),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `UART_CAPTURE_<SECTION>_<KEY>`, for example:
/// - `UART_CAPTURE_SERIAL_PORT=/dev/ttyUSB0`
/// - `UART_CAPTURE_SERIAL_BAUD_RATE=115200`
/// - `UART_CAPTURE_CAPTURE_STRATEGY=buffered`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial
    if let Some((name, val)) = env_var("SERIAL_ENABLED") {
        config.serial.enabled = parse_bool(&name, &val)?;
    }
    if let Some((_, val)) = env_var("SERIAL_PORT") {
        config.serial.port = Some(val);
    }
    if let Some((_, val)) = env_var("SERIAL_DESCRIPTION") {
        config.serial.description = Some(val);
    }
    if let Some((name, val)) = env_var("SERIAL_BAUD_RATE") {
        config.serial.baud_rate = parse_env(&name, &val, "baud rate")?;
    }
    if let Some((name, val)) = env_var("SERIAL_TIMEOUT_MS") {
        config.serial.timeout_ms = parse_env(&name, &val, "timeout")?;
    }

    // Capture
    if let Some((name, val)) = env_var("CAPTURE_STRATEGY") {
        config.capture.strategy = parse_env(&name, &val, "capture strategy")?;
    }
    if let Some((name, val)) = env_var("CAPTURE_CHUNK_SIZE") {
        config.capture.chunk_size = parse_env(&name, &val, "chunk size")?;
    }
    if let Some((_, val)) = env_var("CAPTURE_OUTPUT") {
        config.capture.output = PathBuf::from(val);
    }

    // Logging
    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some((name, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = parse_log_format(&name, &val)?;
    }
    if let Some((_, val)) = env_var("LOGGING_FILE") {
        config.logging.file = Some(PathBuf::from(val));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureStrategy;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert!(loader.config_path.is_none());
        assert_eq!(loader.config().serial.baud_rate, 38400);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("UART_CAPTURE_SERIAL_BAUD_RATE", "115200");
        env::set_var("UART_CAPTURE_CAPTURE_STRATEGY", "1");
        env::set_var("UART_CAPTURE_SERIAL_ENABLED", "off");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 115200);
        assert_eq!(loader.config().capture.strategy, CaptureStrategy::Buffered);
        assert!(!loader.config().serial.enabled);

        env::remove_var("UART_CAPTURE_SERIAL_BAUD_RATE");
        env::remove_var("UART_CAPTURE_CAPTURE_STRATEGY");
        env::remove_var("UART_CAPTURE_SERIAL_ENABLED");
    }

    #[test]
    #[serial]
    fn test_bad_env_override_is_reported() {
        env::set_var("UART_CAPTURE_SERIAL_TIMEOUT_MS", "soon");
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        env::remove_var("UART_CAPTURE_SERIAL_TIMEOUT_MS");

        assert!(matches!(
            err,
            ConfigError::EnvParseError { ref var, .. } if var == "UART_CAPTURE_SERIAL_TIMEOUT_MS"
        ));
    }

    #[test]
    #[serial]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("uart-capture.toml");

        let mut loader = ConfigLoader::with_defaults();
        loader.config_mut().serial.description = Some("CP2102".to_string());
        loader.config_mut().capture.output = PathBuf::from("uart_%Y%m%d.log");
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(reloaded.config(), loader.config());
    }

    #[test]
    #[serial]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[capture]\nchunk_size = 0\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from(&path),
            Err(ConfigError::ValidationError { .. })
        ));
        assert!(matches!(
            ConfigLoader::load_from(dir.path().join("missing.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uart_capture::capture::CaptureStrategy;
use uart_capture::config::{Config, ConfigLoader};
use uart_capture::port::{discovery, PortIdentifier};
use uart_capture::{build_uart, logging, CaptureResult, Coordinator, Uart};

#[derive(Parser, Debug)]
#[command(
    name = "uart-capture",
    version,
    about = "Capture serial device output to a file while another command runs."
)]
struct Cli {
    /// Configuration file (overrides the standard search locations)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use the inert port: commands run without touching any device
    #[arg(long, global = true)]
    disabled: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

/// Which device to open; falls back to the configuration.
#[derive(clap::Args, Debug)]
struct DeviceArgs {
    /// Device path, e.g. /dev/ttyUSB0 or COM3
    #[arg(long, conflicts_with = "description")]
    port: Option<String>,

    /// Match an attached device by its description, e.g. "CP2102"
    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    baud: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List attached serial devices
    List {
        #[arg(long)]
        json: bool,
    },
    /// Capture device output while running a command or for a fixed time
    Capture {
        #[command(flatten)]
        device: DeviceArgs,

        /// Capture file (strftime fields are expanded)
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum)]
        strategy: Option<CaptureStrategy>,

        /// Seconds to capture when no command is given
        #[arg(long, value_name = "SECS", required_unless_present = "command")]
        duration: Option<f64>,

        /// Command to run while capturing
        #[arg(last = true, value_name = "CMD")]
        command: Vec<String>,
    },
    /// Read from the device and write the bytes to stdout
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        #[arg(long, value_name = "SECS", default_value_t = 1.0)]
        duration: f64,
    },
    /// Write a string to the device
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        data: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    };
    let mut config = match loaded {
        Ok(loader) => loader.into_config(),
        Err(e) => {
            eprintln!("uart-capture: {}", e);
            return ExitCode::from(2);
        }
    };

    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    if let Err(e) = logging::init_tracing(&config.logging) {
        eprintln!("uart-capture: {}", e);
    }
    if cli.disabled {
        config.serial.enabled = false;
    }

    let ok = match cli.command {
        Cmd::List { json } => list(json),
        Cmd::Capture {
            device,
            output,
            strategy,
            duration,
            command,
        } => {
            if let Some(output) = output {
                config.capture.output = output;
            }
            if let Some(strategy) = strategy {
                config.capture.strategy = strategy;
            }
            capture(&config, &device, duration, &command)
        }
        Cmd::Read { device, duration } => read(&config, &device, duration),
        Cmd::Write { device, data } => write(&config, &device, &data),
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn list(json: bool) -> bool {
    let ports = match discovery::list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            error!("Cannot enumerate serial devices: {}", e);
            return false;
        }
    };

    if json {
        match serde_json::to_string_pretty(&ports) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Cannot encode device list: {}", e);
                return false;
            }
        }
    } else if ports.is_empty() {
        println!("No serial devices found");
    } else {
        for port in &ports {
            println!("{:<20} {}", port.port_name, port.description);
        }
    }
    true
}

/// Build the port and open it. A disabled port is returned unopened.
fn open_uart(config: &Config, device: &DeviceArgs) -> Option<Arc<dyn Uart>> {
    let uart = build_uart(config);
    if !uart.is_enabled() {
        return Some(uart);
    }

    let identifier = match (&device.port, &device.description) {
        (Some(port), _) => Some(PortIdentifier::parse(&config.serial.resolve_alias(port))),
        (None, Some(description)) => Some(PortIdentifier::Description(description.clone())),
        (None, None) => config.serial.identifier(),
    };
    let Some(identifier) = identifier else {
        error!("No device given; pass --port or --description, or set serial.port in the config");
        return None;
    };

    let baud_rate = device.baud.unwrap_or(config.serial.baud_rate);
    if uart.open(&identifier, baud_rate, config.serial.timeout()) {
        Some(uart)
    } else {
        None
    }
}

fn capture(config: &Config, device: &DeviceArgs, duration: Option<f64>, command: &[String]) -> bool {
    let Some(wait) = seconds(duration.unwrap_or(0.0)) else {
        return false;
    };
    let Some(uart) = open_uart(config, device) else {
        return false;
    };
    let coordinator = Coordinator::new(Arc::clone(&uart));
    let target = config.capture.output_path(&chrono::Local::now());
    let strategy = config.capture.strategy;
    let started = Instant::now();

    let result = match command.split_first() {
        Some((program, args)) => coordinator.save_uart_data(
            || run_command(program, args),
            &target,
            strategy,
        ),
        None => coordinator.capture_for(wait, &target, strategy),
    };
    uart.close();

    let elapsed = started.elapsed();
    match result {
        CaptureResult::Completed(()) => {
            if uart.is_enabled() {
                let size = std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
                info!(
                    "Captured {} bytes to {} in {:.2?} ({})",
                    size,
                    target.display(),
                    elapsed,
                    strategy
                );
            } else {
                info!("Capture disabled; operation finished in {:.2?}", elapsed);
            }
            true
        }
        CaptureResult::Failed(reason) => {
            error!("Capture run failed after {:.2?}: {}", elapsed, reason);
            false
        }
    }
}

/// A `--duration` value as a `Duration`. Negative values mean zero; values
/// too large to represent (including `inf`) are rejected.
fn seconds(secs: f64) -> Option<Duration> {
    match Duration::try_from_secs_f64(secs.max(0.0)) {
        Ok(duration) => Some(duration),
        Err(e) => {
            error!("Invalid duration {} s: {}", secs, e);
            None
        }
    }
}

fn run_command(program: &str, args: &[String]) -> Result<(), String> {
    info!("Running {} {}", program, args.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| format!("cannot run {}: {}", program, e))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{} exited with {}", program, status))
    }
}

fn read(config: &Config, device: &DeviceArgs, duration: f64) -> bool {
    let Some(duration) = seconds(duration) else {
        return false;
    };
    let Some(uart) = open_uart(config, device) else {
        return false;
    };
    if !uart.is_enabled() {
        warn!("Serial capture disabled; nothing to read");
        return true;
    }

    let result = uart.read_for(duration);
    uart.close();
    match result {
        Ok(bytes) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(&bytes).and_then(|_| stdout.flush()) {
                error!("Cannot write to stdout: {}", e);
                return false;
            }
            true
        }
        Err(e) => {
            error!("Read failed: {}", e);
            false
        }
    }
}

fn write(config: &Config, device: &DeviceArgs, data: &str) -> bool {
    let Some(uart) = open_uart(config, device) else {
        return false;
    };
    if !uart.is_enabled() {
        warn!("Serial capture disabled; nothing written");
        return true;
    }

    let result = uart.write_str(data);
    uart.close();
    match result {
        Ok(n) => {
            info!("Wrote {} bytes", n);
            true
        }
        Err(e) => {
            error!("Write failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parsing() {
        assert_eq!(seconds(1.5), Some(Duration::from_millis(1500)));
        assert_eq!(seconds(-3.0), Some(Duration::ZERO));
        assert_eq!(seconds(f64::INFINITY), None);
        assert_eq!(seconds(1e30), None);
    }

    #[test]
    fn test_cli_accepts_infinite_duration_without_panicking() {
        let cli = Cli::try_parse_from(["uart-capture", "--disabled", "capture", "--duration", "inf"])
            .unwrap();
        let Cmd::Capture { device, duration, command, .. } = cli.command else {
            panic!("expected capture subcommand");
        };
        let mut config = Config::default();
        config.serial.enabled = false;

        assert!(!capture(&config, &device, duration, &command));
    }
}

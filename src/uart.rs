//! The capture port: a serial connection plus at most one capture session.
//!
//! Whether hardware capture is enabled is decided once, at construction:
//! [`build_uart`] returns either a [`HardwareUart`] or a [`DisabledUart`].
//! Both implement [`Uart`], so harness code calls the same methods either
//! way and a disabled setup simply does nothing.

use crate::capture::{CaptureSession, CaptureStrategy, CaptureSummary, SessionId, DEFAULT_CHUNK_SIZE};
use crate::config::Config;
use crate::error::CaptureError;
use crate::port::{
    Connector, PortConfiguration, PortError, PortIdentifier, SharedPort, SystemConnector,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Read size used by `read_for` between clock checks.
const READ_FOR_STEP: usize = 4;

/// Serial connection used by test harness code.
pub trait Uart: Send + Sync + std::fmt::Debug {
    /// False for the inert implementation.
    fn is_enabled(&self) -> bool;

    /// Open the device. Failures are logged and reported as `false`.
    fn open(&self, identifier: &PortIdentifier, baud_rate: u32, timeout: Duration) -> bool;

    /// Flush output, stop any capture, release the device. No-op when closed.
    fn close(&self);

    fn is_open(&self) -> bool;

    /// Name of the open device, if any.
    fn name(&self) -> Option<String>;

    /// One read of up to `size` bytes; empty on timeout.
    fn read(&self, size: usize) -> Result<Vec<u8>, PortError>;

    /// Read for a wall-clock `duration`. A zero duration is one `read(1024)`.
    fn read_for(&self, duration: Duration) -> Result<Vec<u8>, PortError>;

    /// Whatever the device has buffered right now.
    fn read_available(&self) -> Result<Vec<u8>, PortError>;

    fn write(&self, data: &[u8]) -> Result<usize, PortError>;

    fn write_str(&self, text: &str) -> Result<usize, PortError> {
        self.write(text.as_bytes())
    }

    /// Start capturing into `target`. `Ok(None)` means capture is disabled.
    fn start_capture(
        &self,
        strategy: CaptureStrategy,
        target: &Path,
    ) -> Result<Option<SessionId>, CaptureError>;

    /// Stop the active capture. `None` (and a log line) if there is none.
    fn stop_capture(&self) -> Option<CaptureSummary>;

    /// Stop the active capture only if it is session `id`.
    ///
    /// `None` if that session already ended, for example because the port
    /// was closed, and a newer session is left running.
    fn stop_session(&self, id: SessionId) -> Option<CaptureSummary>;

    fn is_capturing(&self) -> bool;
}

/// Build the implementation selected by `serial.enabled`.
pub fn build_uart(config: &Config) -> Arc<dyn Uart> {
    if config.serial.enabled {
        Arc::new(HardwareUart::new(SystemConnector).with_chunk_size(config.capture.chunk_size))
    } else {
        info!("Serial capture disabled; using inert port");
        Arc::new(DisabledUart)
    }
}

/// Open/close/start/stop are serialized through this.
#[derive(Debug, Default)]
struct Control {
    session: Option<CaptureSession>,
}

/// A real serial connection.
#[derive(Debug)]
pub struct HardwareUart {
    connector: Box<dyn Connector>,
    port: SharedPort,
    control: Mutex<Control>,
    chunk_size: usize,
}

impl HardwareUart {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            port: SharedPort::new(),
            control: Mutex::new(Control::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the capture chunk size (bytes per read).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn try_open(&self, identifier: &PortIdentifier, config: &PortConfiguration) -> Result<(), PortError> {
        if self.port.is_open() {
            return Err(PortError::AlreadyOpen);
        }
        let adapter = self.connector.connect(identifier, config)?;
        self.port.attach(adapter);
        Ok(())
    }
}

impl Uart for HardwareUart {
    fn is_enabled(&self) -> bool {
        true
    }

    fn open(&self, identifier: &PortIdentifier, baud_rate: u32, timeout: Duration) -> bool {
        let _control = self.control.lock();
        let config = PortConfiguration::new(baud_rate, timeout);
        match self.try_open(identifier, &config) {
            Ok(()) => {
                info!(
                    "Serial {} open success ({} baud)",
                    self.port.name().unwrap_or_else(|| identifier.to_string()),
                    baud_rate
                );
                true
            }
            Err(e) => {
                error!("Serial {} open fail: {}", identifier, e);
                false
            }
        }
    }

    fn close(&self) {
        let mut control = self.control.lock();
        let Some(name) = self.port.name() else {
            debug!("Close requested on a closed port");
            return;
        };

        if let Err(e) = self.port.flush_output() {
            warn!("Failed to flush {} before close: {}", name, e);
        }
        if let Some(session) = control.session.take() {
            session.stop();
        }
        self.port.detach();
        info!("Serial {} closed", name);
    }

    fn is_open(&self) -> bool {
        self.port.is_open()
    }

    fn name(&self) -> Option<String> {
        self.port.name()
    }

    fn read(&self, size: usize) -> Result<Vec<u8>, PortError> {
        self.port.read(size)
    }

    fn read_for(&self, duration: Duration) -> Result<Vec<u8>, PortError> {
        if duration.is_zero() {
            return self.read(DEFAULT_CHUNK_SIZE);
        }
        let mut buffer = Vec::new();
        let started = Instant::now();
        while started.elapsed() < duration {
            buffer.extend(self.port.read(READ_FOR_STEP)?);
        }
        Ok(buffer)
    }

    fn read_available(&self) -> Result<Vec<u8>, PortError> {
        match self.port.bytes_to_read()? {
            Some(0) => Ok(Vec::new()),
            Some(pending) => self.port.read(pending),
            None => self.port.read(DEFAULT_CHUNK_SIZE),
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data)
    }

    fn start_capture(
        &self,
        strategy: CaptureStrategy,
        target: &Path,
    ) -> Result<Option<SessionId>, CaptureError> {
        let mut control = self.control.lock();
        if control.session.is_some() {
            warn!("Capture already running; refusing to start another");
            return Err(CaptureError::SessionActive);
        }
        let session = CaptureSession::start(&self.port, strategy, target, self.chunk_size)?;
        let id = session.id();
        control.session = Some(session);
        Ok(Some(id))
    }

    fn stop_capture(&self) -> Option<CaptureSummary> {
        let session = self.control.lock().session.take();
        match session {
            Some(session) => Some(session.stop()),
            None => {
                warn!("Stop requested but no capture is running");
                None
            }
        }
    }

    fn stop_session(&self, id: SessionId) -> Option<CaptureSummary> {
        let session = {
            let mut control = self.control.lock();
            match control.session.as_ref().map(CaptureSession::id) {
                Some(active) if active == id => control.session.take(),
                Some(active) => {
                    warn!("Capture {} already ended; leaving {} running", id, active);
                    None
                }
                None => {
                    warn!("Capture {} already ended", id);
                    None
                }
            }
        };
        session.map(CaptureSession::stop)
    }

    fn is_capturing(&self) -> bool {
        self.control.lock().session.is_some()
    }
}

impl Drop for HardwareUart {
    fn drop(&mut self) {
        self.close();
    }
}

/// Inert port used when hardware capture is turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledUart;

impl Uart for DisabledUart {
    fn is_enabled(&self) -> bool {
        false
    }

    fn open(&self, identifier: &PortIdentifier, _baud_rate: u32, _timeout: Duration) -> bool {
        debug!("Serial capture disabled; not opening {}", identifier);
        false
    }

    fn close(&self) {}

    fn is_open(&self) -> bool {
        false
    }

    fn name(&self) -> Option<String> {
        None
    }

    fn read(&self, _size: usize) -> Result<Vec<u8>, PortError> {
        Ok(Vec::new())
    }

    fn read_for(&self, _duration: Duration) -> Result<Vec<u8>, PortError> {
        Ok(Vec::new())
    }

    fn read_available(&self) -> Result<Vec<u8>, PortError> {
        Ok(Vec::new())
    }

    fn write(&self, _data: &[u8]) -> Result<usize, PortError> {
        Ok(0)
    }

    fn start_capture(
        &self,
        _strategy: CaptureStrategy,
        _target: &Path,
    ) -> Result<Option<SessionId>, CaptureError> {
        Ok(None)
    }

    fn stop_capture(&self) -> Option<CaptureSummary> {
        None
    }

    fn stop_session(&self, _id: SessionId) -> Option<CaptureSummary> {
        None
    }

    fn is_capturing(&self) -> bool {
        false
    }
}

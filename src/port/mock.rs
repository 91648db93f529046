//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` replays scripted chunks instead of talking to hardware:
//! every read returns at most one scripted chunk, and once the script runs
//! dry reads behave like a quiet device (sleep for the timeout, return 0).
//! Clones share state, so a test can keep a handle while the capture
//! threads own another.

use super::discovery::PortIdentifier;
use super::error::PortError;
use super::traits::{Connector, PortConfiguration, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Chunks to be returned by read operations, one per read.
    read_chunks: VecDeque<Vec<u8>>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Configured timeout duration.
    timeout: Duration,
    /// Remaining successful reads before the device "disappears".
    reads_before_failure: Option<usize>,
    /// Whether writes should fail.
    fail_writes: bool,
    /// Number of read calls served.
    read_calls: usize,
    /// Total bytes handed out by reads.
    bytes_served: usize,
    /// Number of output flushes.
    flushes: usize,
}

/// Mock serial port implementation for testing.
///
/// # Example
/// ```
/// use uart_capture::port::{MockSerialPort, SerialPortAdapter};
///
/// let port = MockSerialPort::new("MOCK0");
/// port.enqueue_chunk(b"AA");
/// port.enqueue_chunk(b"BB");
///
/// let mut reader = port.clone();
/// let mut buffer = [0u8; 16];
/// let n = reader.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"AA");
///
/// reader.write_bytes(b"reboot\n").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"reboot\n".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    /// Shared state; every clone sees the same script and logs.
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(5),
                ..Default::default()
            })),
        }
    }

    /// Script one chunk to be returned by a later read.
    pub fn enqueue_chunk(&self, data: &[u8]) {
        self.state.lock().read_chunks.push_back(data.to_vec());
    }

    /// Script several chunks in order.
    pub fn enqueue_chunks<'a>(&self, chunks: impl IntoIterator<Item = &'a [u8]>) {
        let mut state = self.state.lock();
        state
            .read_chunks
            .extend(chunks.into_iter().map(|c| c.to_vec()));
    }

    /// Let `reads` more reads succeed, then fail every read after that.
    pub fn fail_reads_after(&self, reads: usize) {
        self.state.lock().reads_before_failure = Some(reads);
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Number of scripted chunks not yet read.
    pub fn pending_chunks(&self) -> usize {
        self.state.lock().read_chunks.len()
    }

    /// Number of read calls served so far.
    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    /// Total bytes handed out by reads so far.
    pub fn bytes_served(&self) -> usize {
        self.state.lock().bytes_served
    }

    /// Number of times pending output was flushed.
    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }

    /// The timeout most recently configured.
    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(PortError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device rejected write",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        state.read_calls += 1;

        if let Some(remaining) = state.reads_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock device disconnected",
                )));
            }
            *remaining -= 1;
        }

        match state.read_chunks.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buffer.len());
                buffer[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Leave the unread tail for the next read.
                    chunk.drain(..n);
                    state.read_chunks.push_front(chunk);
                }
                state.bytes_served += n;
                Ok(n)
            }
            None => {
                // Quiet device: wait out the timeout without holding the lock.
                let timeout = state.timeout;
                drop(state);
                std::thread::sleep(timeout);
                Ok(0)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn flush_output(&mut self) -> Result<(), PortError> {
        self.state.lock().flushes += 1;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        let state = self.state.lock();
        Some(state.read_chunks.iter().map(Vec::len).sum())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("pending_chunks", &self.pending_chunks())
            .finish()
    }
}

/// Connector handing out clones of one `MockSerialPort`.
#[derive(Debug, Clone)]
pub struct MockConnector {
    port: MockSerialPort,
    missing: bool,
}

impl MockConnector {
    /// Every connect succeeds and yields `port`.
    pub fn new(port: MockSerialPort) -> Self {
        Self {
            port,
            missing: false,
        }
    }

    /// Every connect fails as if no device were attached.
    pub fn missing() -> Self {
        Self {
            port: MockSerialPort::new("MISSING"),
            missing: true,
        }
    }

    /// The shared mock behind this connector.
    pub fn port(&self) -> &MockSerialPort {
        &self.port
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        identifier: &PortIdentifier,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        if self.missing {
            return Err(PortError::not_found(identifier.to_string()));
        }
        let mut port = self.port.clone();
        port.set_timeout(config.timeout)?;
        Ok(Box::new(port))
    }
}

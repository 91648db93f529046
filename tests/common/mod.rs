//! Shared test utilities for uart-capture integration tests.
//!
//! - Mock-backed ports, opened and ready to capture
//! - Polling helpers for waiting on capture threads

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uart_capture::port::{MockConnector, MockSerialPort, PortIdentifier};
use uart_capture::{HardwareUart, Uart};

/// Read timeout used by mock ports in these tests.
pub const MOCK_TIMEOUT: Duration = Duration::from_millis(5);

/// Create a mock port pre-loaded with `chunks`, one per read.
pub fn mock_with_chunks(name: &str, chunks: &[&[u8]]) -> MockSerialPort {
    let mock = MockSerialPort::new(name);
    mock.enqueue_chunks(chunks.iter().copied());
    mock
}

/// A hardware port backed by `mock`, already open.
pub fn open_mock_uart(mock: &MockSerialPort) -> Arc<dyn Uart> {
    let uart = HardwareUart::new(MockConnector::new(mock.clone()));
    assert!(
        uart.open(&PortIdentifier::Path("MOCK0".into()), 38400, MOCK_TIMEOUT),
        "mock port should open"
    );
    Arc::new(uart)
}

/// A temporary directory plus a capture file path inside it.
pub fn capture_target(file_name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(file_name);
    (dir, path)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

//! Capture sessions driven directly against a shared mock port.

mod common;

use common::{capture_target, mock_with_chunks, open_mock_uart, wait_until};
use proptest::prelude::*;
use std::time::Duration;
use uart_capture::capture::CaptureSession;
use uart_capture::port::{MockSerialPort, SharedPort};
use uart_capture::CaptureStrategy;

const SETTLE: Duration = Duration::from_secs(5);

fn shared(mock: &MockSerialPort) -> SharedPort {
    SharedPort::from_adapter(Box::new(mock.clone()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn buffered_capture_writes_every_chunk_in_order(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..24)
    ) {
        let (_dir, target) = capture_target("prop.bin");
        let mock = MockSerialPort::new("MOCK0");
        mock.enqueue_chunks(chunks.iter().map(Vec::as_slice));
        let port = shared(&mock);

        let session = CaptureSession::start(&port, CaptureStrategy::Buffered, &target, 1024).unwrap();
        // Stop as soon as the device has handed out its last byte.
        prop_assert!(wait_until(SETTLE, || mock.pending_chunks() == 0));
        let summary = session.stop();

        let expected: Vec<u8> = chunks.concat();
        prop_assert_eq!(std::fs::read(&target).unwrap(), expected.clone());
        prop_assert_eq!(summary.bytes_written, expected.len() as u64);
        prop_assert_eq!(summary.bytes_read, summary.bytes_written);
        prop_assert!(summary.clean);
    }
}

#[test]
fn small_chunk_size_splits_reads_without_losing_bytes() {
    let (_dir, target) = capture_target("split.bin");
    let mock = mock_with_chunks("MOCK0", &[b"0123456789", b"abcdef"]);
    let port = shared(&mock);

    let session = CaptureSession::start(&port, CaptureStrategy::Direct, &target, 3).unwrap();
    assert!(wait_until(SETTLE, || mock.pending_chunks() == 0));
    let summary = session.stop();

    assert_eq!(std::fs::read(&target).unwrap(), b"0123456789abcdef");
    assert_eq!(summary.bytes_written, 16);
}

#[test]
fn close_during_buffered_capture_flushes_queue() {
    let (_dir, target) = capture_target("close.bin");
    let chunks: Vec<Vec<u8>> = (0..200u8).map(|i| vec![i; 37]).collect();
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mock = MockSerialPort::new("MOCK0");
    mock.enqueue_chunks(chunks.iter().map(Vec::as_slice));
    let uart = open_mock_uart(&mock);

    assert!(uart.start_capture(CaptureStrategy::Buffered, &target).unwrap().is_some());
    assert!(wait_until(SETTLE, || mock.pending_chunks() == 0));
    uart.close();

    assert!(!uart.is_capturing());
    assert!(!uart.is_open());
    assert_eq!(std::fs::metadata(&target).unwrap().len(), total as u64);
    assert_eq!(std::fs::read(&target).unwrap(), chunks.concat());
}

#[test]
fn read_error_ends_capture_with_partial_file() {
    let (_dir, target) = capture_target("partial.bin");
    let mock = mock_with_chunks("MOCK0", &[b"one", b"two", b"three"]);
    mock.fail_reads_after(2);
    let port = shared(&mock);

    let session = CaptureSession::start(&port, CaptureStrategy::Buffered, &target, 1024).unwrap();
    assert!(wait_until(SETTLE, || mock.read_calls() >= 3));
    let summary = session.stop();

    assert_eq!(std::fs::read(&target).unwrap(), b"onetwo");
    assert!(summary.clean);
}

#[test]
fn port_stays_usable_while_capturing() {
    let (_dir, target) = capture_target("shared.bin");
    let mock = MockSerialPort::new("MOCK0");
    let uart = open_mock_uart(&mock);

    uart.start_capture(CaptureStrategy::Direct, &target).unwrap();
    assert_eq!(uart.write_str("reboot\r\n").unwrap(), 8);
    uart.stop_capture().unwrap();

    assert_eq!(mock.get_write_log(), vec![b"reboot\r\n".to_vec()]);
}

/// True once the device has stopped being read for a while.
#[cfg(target_os = "linux")]
fn reads_have_stopped(mock: &MockSerialPort) -> bool {
    let before = mock.read_calls();
    std::thread::sleep(Duration::from_millis(30));
    before > 0 && before == mock.read_calls()
}

#[cfg(target_os = "linux")]
#[test]
fn write_error_ends_capture_for_both_strategies() {
    use std::path::Path;
    use std::time::Instant;

    for strategy in [CaptureStrategy::Direct, CaptureStrategy::Buffered] {
        let chunks: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i; 64]).collect();
        let mock = MockSerialPort::new("MOCK0");
        mock.enqueue_chunks(chunks.iter().map(Vec::as_slice));
        let port = shared(&mock);

        // Every write to /dev/full fails with ENOSPC.
        let session = CaptureSession::start(&port, strategy, Path::new("/dev/full"), 1024).unwrap();
        assert!(
            wait_until(SETTLE, || reads_have_stopped(&mock)),
            "{} capture kept reading after its write failed",
            strategy
        );

        let stopping = Instant::now();
        let summary = session.stop();
        assert!(stopping.elapsed() < Duration::from_secs(1));
        assert_eq!(summary.bytes_written, 0, "{}", strategy);
        assert!(summary.clean);
    }
}

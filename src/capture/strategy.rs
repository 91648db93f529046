//! The two ways of moving bytes from the port into the capture file.
//!
//! *Direct*: one thread reads a chunk and appends it, in a loop.
//! *Buffered*: a reader thread pushes chunks onto a [`ChunkQueue`] and a
//! writer thread drains it to the file, so slow disk writes never delay the
//! next device read.

use super::queue::{Chunk, ChunkQueue};
use crate::port::SharedPort;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Default capture granularity in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Capture algorithm selector.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStrategy {
    /// Single thread: read, then append.
    #[default]
    Direct,
    /// Reader thread -> queue -> writer thread.
    Buffered,
}

impl CaptureStrategy {
    /// Map the numeric selector used by harness scripts (`0`, `1`).
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Direct),
            1 => Some(Self::Buffered),
            _ => None,
        }
    }

    /// Number of threads a session with this strategy runs.
    pub fn task_count(self) -> usize {
        match self {
            Self::Direct => 1,
            Self::Buffered => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Buffered => "buffered",
        }
    }
}

impl fmt::Display for CaptureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "0" => Ok(Self::Direct),
            "buffered" | "1" => Ok(Self::Buffered),
            other => Err(format!(
                "unknown capture strategy '{other}' (expected direct or buffered)"
            )),
        }
    }
}

/// What one capture thread did before it exited.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub bytes: u64,
    pub chunks: u64,
}

impl TaskReport {
    fn record(&mut self, len: usize) {
        self.bytes += len as u64;
        self.chunks += 1;
    }
}

/// Direct loop: read and append until the flag clears.
///
/// At most one read is still in flight when the flag clears; its bytes are
/// written before returning.
pub(crate) fn run_direct<W: Write>(
    port: &SharedPort,
    running: &AtomicBool,
    chunk_size: usize,
    out: &mut W,
) -> TaskReport {
    let mut report = TaskReport::default();
    while running.load(Ordering::Acquire) {
        let bytes = match port.read(chunk_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Capture read failed, stopping direct capture: {}", e);
                break;
            }
        };
        if bytes.is_empty() {
            continue;
        }
        if let Err(e) = out.write_all(&bytes) {
            error!("Capture write failed, stopping direct capture: {}", e);
            break;
        }
        report.record(bytes.len());
    }
    if let Err(e) = out.flush() {
        error!("Failed to flush capture file: {}", e);
    }
    debug!(
        "Direct capture finished: {} bytes in {} chunks",
        report.bytes, report.chunks
    );
    report
}

/// Closes the queue however the reader exits, so the writer never waits on
/// a producer that is gone.
struct CloseOnExit<'a>(&'a ChunkQueue);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Buffered reader: read chunks onto the queue until the flag clears.
pub(crate) fn run_reader(
    port: &SharedPort,
    running: &AtomicBool,
    chunk_size: usize,
    queue: &ChunkQueue,
) -> TaskReport {
    let _close = CloseOnExit(queue);
    let mut report = TaskReport::default();
    while running.load(Ordering::Acquire) {
        match port.read(chunk_size) {
            Ok(bytes) => {
                let len = bytes.len();
                if !queue.push(Chunk::from(bytes)) {
                    error!("Capture writer is gone, stopping reader");
                    break;
                }
                report.record(len);
            }
            Err(e) => {
                error!("Capture read failed, stopping reader: {}", e);
                break;
            }
        }
    }
    debug!(
        "Capture reader finished: {} bytes in {} reads",
        report.bytes, report.chunks
    );
    report
}

/// Abandons the queue however the writer exits, so the reader stops
/// producing chunks nobody will write.
struct AbandonOnExit<'a>(&'a ChunkQueue);

impl Drop for AbandonOnExit<'_> {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

/// Buffered writer: append chunks until the queue is closed and empty.
///
/// The running flag is not consulted; exiting on the flag
/// would drop whatever is still queued.
pub(crate) fn run_writer<W: Write>(queue: &ChunkQueue, out: &mut W) -> TaskReport {
    let _abandon = AbandonOnExit(queue);
    let mut report = TaskReport::default();
    while let Some(chunk) = queue.pop_blocking() {
        if chunk.is_empty() {
            continue;
        }
        if let Err(e) = out.write_all(chunk.as_bytes()) {
            error!(
                "Capture write failed, stopping writer with {} chunk(s) queued: {}",
                queue.len(),
                e
            );
            break;
        }
        report.record(chunk.len());
    }
    if let Err(e) = out.flush() {
        error!("Failed to flush capture file: {}", e);
    }
    debug!(
        "Capture writer finished: {} bytes in {} chunks",
        report.bytes, report.chunks
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockSerialPort;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// A sink whose every write fails, like a full disk.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn mock_port(chunks: &[&[u8]]) -> (MockSerialPort, SharedPort) {
        let mock = MockSerialPort::new("MOCK0");
        mock.enqueue_chunks(chunks.iter().copied());
        let shared = SharedPort::from_adapter(Box::new(mock.clone()));
        (mock, shared)
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("direct".parse::<CaptureStrategy>(), Ok(CaptureStrategy::Direct));
        assert_eq!("Buffered".parse::<CaptureStrategy>(), Ok(CaptureStrategy::Buffered));
        assert_eq!("1".parse::<CaptureStrategy>(), Ok(CaptureStrategy::Buffered));
        assert!("fast".parse::<CaptureStrategy>().is_err());
        assert_eq!(CaptureStrategy::from_index(0), Some(CaptureStrategy::Direct));
        assert_eq!(CaptureStrategy::from_index(2), None);
        assert_eq!(CaptureStrategy::Buffered.task_count(), 2);
        assert_eq!(CaptureStrategy::default(), CaptureStrategy::Direct);
    }

    #[test]
    fn test_direct_writes_until_stopped() {
        let (mock, port) = mock_port(&[b"AA", b"BB"]);
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let mut out = Vec::new();
                let report = run_direct(&port, &running, DEFAULT_CHUNK_SIZE, &mut out);
                (report, out)
            })
        };

        while mock.pending_chunks() > 0 {
            thread::sleep(Duration::from_millis(1));
        }
        running.store(false, Ordering::Release);

        let (report, out) = handle.join().unwrap();
        assert_eq!(out, b"AABB");
        assert_eq!(report, TaskReport { bytes: 4, chunks: 2 });
    }

    #[test]
    fn test_direct_exits_on_read_error() {
        let (mock, port) = mock_port(&[b"ok"]);
        mock.fail_reads_after(1);
        let running = AtomicBool::new(true);

        let mut out = Vec::new();
        let report = run_direct(&port, &running, DEFAULT_CHUNK_SIZE, &mut out);

        assert_eq!(out, b"ok");
        assert_eq!(report.bytes, 2);
        assert!(running.load(Ordering::Acquire), "flag is left to the session");
    }

    #[test]
    fn test_direct_exits_on_write_error() {
        let (mock, port) = mock_port(&[b"AA", b"BB", b"CC"]);
        let running = AtomicBool::new(true);

        let report = run_direct(&port, &running, DEFAULT_CHUNK_SIZE, &mut FullDisk);

        assert_eq!(report, TaskReport::default());
        assert_eq!(mock.read_calls(), 1);
        assert!(running.load(Ordering::Acquire));
    }

    #[test]
    fn test_reader_stops_when_writer_fails() {
        let chunks: Vec<Vec<u8>> = (0..500).map(|i| vec![i as u8; 64]).collect();
        let (_mock, port) = mock_port(&chunks.iter().map(Vec::as_slice).collect::<Vec<_>>());
        let running = AtomicBool::new(true);
        let queue = Arc::new(ChunkQueue::new());

        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || run_writer(&queue, &mut FullDisk))
        };
        // Returns on its own while the flag is still set.
        let read = run_reader(&port, &running, DEFAULT_CHUNK_SIZE, &queue);
        let written = writer.join().unwrap();

        assert!(running.load(Ordering::Acquire));
        assert_eq!(written, TaskReport::default());
        assert!(read.bytes <= 500 * 64);
        assert!(queue.is_abandoned());
        assert!(queue.is_closed());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reader_closes_queue_on_error() {
        let (mock, port) = mock_port(&[b"abc"]);
        mock.fail_reads_after(1);
        let running = AtomicBool::new(true);
        let queue = ChunkQueue::new();

        let report = run_reader(&port, &running, DEFAULT_CHUNK_SIZE, &queue);

        assert_eq!(report.bytes, 3);
        assert!(queue.is_closed());
        assert_eq!(queue.pop_blocking().unwrap().as_bytes(), b"abc");
    }

    #[test]
    fn test_writer_drains_everything_queued() {
        let queue = ChunkQueue::new();
        for chunk in [b"one".as_slice(), b"".as_slice(), b"two".as_slice()] {
            queue.push(Chunk::from(chunk));
        }
        queue.close();

        let mut out = Vec::new();
        let report = run_writer(&queue, &mut out);

        assert_eq!(out, b"onetwo");
        assert_eq!(report, TaskReport { bytes: 6, chunks: 2 });
        assert!(queue.is_empty());
    }
}

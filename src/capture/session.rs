//! A running capture: the stop flag plus the threads of one strategy.
//!
//! `CaptureSession::start` opens the target file and spawns the threads;
//! `stop` consumes the session, so a session is stopped and joined exactly
//! once. Dropping a session that was never stopped stops it.

use super::queue::ChunkQueue;
use super::strategy::{run_direct, run_reader, run_writer, CaptureStrategy, TaskReport};
use crate::error::CaptureError;
use crate::port::{PortError, SharedPort};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one capture session for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskRole {
    Direct,
    Reader,
    Writer,
}

impl TaskRole {
    fn thread_name(self) -> &'static str {
        match self {
            Self::Direct => "uart-capture",
            Self::Reader => "uart-capture-reader",
            Self::Writer => "uart-capture-writer",
        }
    }
}

#[derive(Debug)]
struct CaptureTask {
    role: TaskRole,
    handle: JoinHandle<TaskReport>,
}

/// What a stopped session reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub strategy: CaptureStrategy,
    pub target: PathBuf,
    /// Bytes taken from the device.
    pub bytes_read: u64,
    /// Bytes appended to the target file.
    pub bytes_written: u64,
    /// Non-empty chunks appended to the target file.
    pub chunks_written: u64,
    pub elapsed: Duration,
    /// False if any capture thread panicked.
    pub clean: bool,
}

#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    strategy: CaptureStrategy,
    target: PathBuf,
    running: Arc<AtomicBool>,
    tasks: Vec<CaptureTask>,
    started: Instant,
}

impl CaptureSession {
    /// Open `target` for appending and start capturing from `port`.
    ///
    /// Returns as soon as the threads are running; it does not wait for data.
    ///
    /// # Errors
    ///
    /// - `CaptureError::Port(PortError::NotOpen)` if the port is closed
    /// - `CaptureError::Output` if the file cannot be opened
    /// - `CaptureError::Spawn` if a thread cannot be started; any thread
    ///   already started is stopped again before returning
    pub fn start(
        port: &SharedPort,
        strategy: CaptureStrategy,
        target: impl AsRef<Path>,
        chunk_size: usize,
    ) -> Result<Self, CaptureError> {
        let target = target.as_ref().to_path_buf();
        if !port.is_open() {
            return Err(PortError::NotOpen.into());
        }
        let mut file = open_append(&target)?;

        let mut session = Self {
            id: SessionId::next(),
            strategy,
            target,
            running: Arc::new(AtomicBool::new(true)),
            tasks: Vec::with_capacity(strategy.task_count()),
            started: Instant::now(),
        };

        match strategy {
            CaptureStrategy::Direct => {
                let port = port.clone();
                let running = Arc::clone(&session.running);
                session.spawn(TaskRole::Direct, move || {
                    run_direct(&port, &running, chunk_size, &mut file)
                })?;
            }
            CaptureStrategy::Buffered => {
                let queue = Arc::new(ChunkQueue::new());
                {
                    let port = port.clone();
                    let running = Arc::clone(&session.running);
                    let queue = Arc::clone(&queue);
                    session.spawn(TaskRole::Reader, move || {
                        run_reader(&port, &running, chunk_size, &queue)
                    })?;
                }
                session.spawn(TaskRole::Writer, move || run_writer(&queue, &mut file))?;
            }
        }

        info!(
            "Capture {} started ({}) on {} -> {}",
            session.id,
            strategy,
            port.name().unwrap_or_default(),
            session.target.display()
        );
        Ok(session)
    }

    fn spawn<F>(&mut self, role: TaskRole, task: F) -> Result<(), CaptureError>
    where
        F: FnOnce() -> TaskReport + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(role.thread_name().to_string())
            .spawn(task)
            .map_err(CaptureError::Spawn)?;
        self.tasks.push(CaptureTask { role, handle });
        Ok(())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn strategy(&self) -> CaptureStrategy {
        self.strategy
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// True until a stop has been requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request stop, then wait for every thread to finish draining.
    pub fn stop(mut self) -> CaptureSummary {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CaptureSummary {
        self.running.store(false, Ordering::Release);

        let mut summary = CaptureSummary {
            strategy: self.strategy,
            target: self.target.clone(),
            bytes_read: 0,
            bytes_written: 0,
            chunks_written: 0,
            elapsed: Duration::ZERO,
            clean: true,
        };

        for task in self.tasks.drain(..) {
            match task.handle.join() {
                Ok(report) => match task.role {
                    TaskRole::Direct => {
                        summary.bytes_read += report.bytes;
                        summary.bytes_written += report.bytes;
                        summary.chunks_written += report.chunks;
                    }
                    TaskRole::Reader => summary.bytes_read += report.bytes,
                    TaskRole::Writer => {
                        summary.bytes_written += report.bytes;
                        summary.chunks_written += report.chunks;
                    }
                },
                Err(_) => {
                    error!("Capture thread '{}' panicked", task.role.thread_name());
                    summary.clean = false;
                }
            }
        }

        summary.elapsed = self.started.elapsed();
        info!(
            "Capture stopped ({}): {} bytes written to {} in {:?}",
            summary.strategy,
            summary.bytes_written,
            summary.target.display(),
            summary.elapsed
        );
        summary
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            warn!("Capture session dropped without stop; stopping it now");
            self.shutdown();
        }
    }
}

/// Open `path` append-binary, creating it and its parent directory.
fn open_append(path: &Path) -> Result<File, CaptureError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CaptureError::output(path, e))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CaptureError::output(path, e))
}

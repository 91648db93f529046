//! Capture pipeline: chunk queue, strategies and the session that runs them.

pub mod queue;
pub mod session;
pub mod strategy;

pub use queue::{Chunk, ChunkQueue};
pub use session::{CaptureSession, CaptureSummary, SessionId};
pub use strategy::{CaptureStrategy, TaskReport, DEFAULT_CHUNK_SIZE};

//! Unbounded FIFO between the Buffered reader and writer threads.
//!
//! Single producer, single consumer. The producer closes the queue when it
//! stops; the consumer keeps popping until the queue is closed *and* empty,
//! which is what guarantees nothing read from the device is dropped.
//! A consumer that gives up abandons the queue, and further pushes are refused.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// One read's worth of bytes. Possibly empty (a read that timed out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk(Box<[u8]>);

impl Chunk {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for Chunk {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Chunk>,
    closed: bool,
    abandoned: bool,
}

#[derive(Debug, Default)]
pub struct ChunkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Never blocks.
    ///
    /// Returns `false`, dropping the chunk, once the consumer has abandoned
    /// the queue.
    pub fn push(&self, chunk: Chunk) -> bool {
        {
            let mut state = self.state.lock();
            if state.abandoned {
                return false;
            }
            state.chunks.push_back(chunk);
        }
        self.available.notify_one();
        true
    }

    /// Take the oldest chunk, waiting for one if the queue is empty.
    ///
    /// Returns `None` only when the queue has been closed and fully drained.
    pub fn pop_blocking(&self) -> Option<Chunk> {
        let mut state = self.state.lock();
        loop {
            if let Some(chunk) = state.chunks.pop_front() {
                return Some(chunk);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Mark the producer as finished and wake a waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// The consumer is gone: discard what is queued and refuse new chunks.
    pub fn abandon(&self) {
        let mut state = self.state.lock();
        state.abandoned = true;
        state.chunks.clear();
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.lock().abandoned
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().chunks.len()
    }
}

//! The one place an open adapter lives.
//!
//! Capture threads and the owning thread all go through `SharedPort`; each
//! operation holds the lock for a single adapter call, so a write issued
//! while a capture is reading waits at most one read timeout.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to an optionally-open adapter.
#[derive(Debug, Clone, Default)]
pub struct SharedPort {
    inner: Arc<Mutex<Option<Box<dyn SerialPortAdapter>>>>,
}

impl SharedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-open adapter.
    pub fn from_adapter(adapter: Box<dyn SerialPortAdapter>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(adapter))),
        }
    }

    /// Install an adapter, returning the one it replaced.
    pub fn attach(&self, adapter: Box<dyn SerialPortAdapter>) -> Option<Box<dyn SerialPortAdapter>> {
        self.inner.lock().replace(adapter)
    }

    /// Remove and return the adapter, leaving the port closed.
    pub fn detach(&self) -> Option<Box<dyn SerialPortAdapter>> {
        self.inner.lock().take()
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Name of the open device.
    pub fn name(&self) -> Option<String> {
        self.inner.lock().as_ref().map(|p| p.name().to_string())
    }

    /// One read of up to `size` bytes.
    pub fn read(&self, size: usize) -> Result<Vec<u8>, PortError> {
        let mut guard = self.inner.lock();
        let port = guard.as_mut().ok_or(PortError::NotOpen)?;
        let mut buffer = vec![0u8; size];
        let n = port.read_bytes(&mut buffer)?;
        buffer.truncate(n);
        Ok(buffer)
    }

    /// Write all of `data`.
    pub fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        let mut guard = self.inner.lock();
        let port = guard.as_mut().ok_or(PortError::NotOpen)?;
        port.write_bytes(data)
    }

    pub fn flush_output(&self) -> Result<(), PortError> {
        let mut guard = self.inner.lock();
        let port = guard.as_mut().ok_or(PortError::NotOpen)?;
        port.flush_output()
    }

    /// Bytes the device reports as pending, if it can tell.
    pub fn bytes_to_read(&self) -> Result<Option<usize>, PortError> {
        let guard = self.inner.lock();
        let port = guard.as_ref().ok_or(PortError::NotOpen)?;
        Ok(port.bytes_to_read())
    }
}

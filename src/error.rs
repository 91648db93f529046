use crate::port::PortError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or running a capture.
///
/// Failures inside a running capture thread are logged, not returned; this
/// type covers what can go wrong before the threads exist and what the
/// coordinator reports for a failed operation.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The port refused the operation (closed, missing, broken).
    #[error(transparent)]
    Port(#[from] PortError),

    /// A capture is already running on this port.
    #[error("A capture session is already active on this port")]
    SessionActive,

    /// The capture file could not be opened for appending.
    #[error("Cannot open capture file '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to start a capture thread.
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The operation run under capture failed or panicked.
    #[error("Operation failed: {0}")]
    OperationFailure(String),
}

impl CaptureError {
    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }
}

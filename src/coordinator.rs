//! Run an operation while the port is being captured.
//!
//! The coordinator starts a capture session, runs the caller's operation on
//! the current thread, and stops the session before returning, whatever the
//! operation did. Every failure (the operation returned `Err`, panicked, or
//! the capture could not start) comes back as [`CaptureResult::Failed`].

use crate::capture::CaptureStrategy;
use crate::error::CaptureError;
use crate::uart::Uart;
use std::any::Any;
use std::convert::Infallible;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Outcome of a capture-managed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResult<T> {
    /// The operation's own return value.
    Completed(T),
    /// The operation failed; carries the reason that was logged.
    Failed(String),
}

impl<T> CaptureResult<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The value, discarding the failure reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, CaptureError> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(reason) => Err(CaptureError::OperationFailure(reason)),
        }
    }
}

/// Runs operations under capture on one port.
#[derive(Debug, Clone)]
pub struct Coordinator {
    uart: Arc<dyn Uart>,
}

impl Coordinator {
    pub fn new(uart: Arc<dyn Uart>) -> Self {
        Self { uart }
    }

    pub fn uart(&self) -> &Arc<dyn Uart> {
        &self.uart
    }

    /// Run `operation` while capturing the port into `target`.
    ///
    /// With a disabled port the operation runs directly and no file is
    /// touched. With an enabled port the capture must start first (the port
    /// has to be open); if it cannot, the operation is not run.
    pub fn save_uart_data<T, E, F>(
        &self,
        operation: F,
        target: impl AsRef<Path>,
        strategy: CaptureStrategy,
    ) -> CaptureResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let target = target.as_ref();
        if !self.uart.is_enabled() {
            return invoke(operation);
        }

        let id = match self.uart.start_capture(strategy, target) {
            Ok(Some(id)) => id,
            Ok(None) => return invoke(operation),
            Err(e) => {
                error!("Capture to {} could not start: {}", target.display(), e);
                return CaptureResult::Failed(e.to_string());
            }
        };

        // `invoke` never unwinds, so this stop always runs. Only the session
        // started here is stopped; one started meanwhile by another caller
        // keeps running.
        let outcome = invoke(operation);
        match self.uart.stop_session(id) {
            Some(summary) if !summary.clean => {
                warn!("Capture to {} ended abnormally", target.display())
            }
            Some(_) => {}
            None => warn!("Capture {} ended before the operation finished", id),
        }
        outcome
    }

    /// `save_uart_data` for an operation that cannot fail.
    pub fn run<T, F>(&self, operation: F, target: impl AsRef<Path>, strategy: CaptureStrategy) -> CaptureResult<T>
    where
        F: FnOnce() -> T,
    {
        self.save_uart_data(|| Ok::<T, Infallible>(operation()), target, strategy)
    }

    /// Capture for a fixed wall-clock duration.
    pub fn capture_for(
        &self,
        duration: Duration,
        target: impl AsRef<Path>,
        strategy: CaptureStrategy,
    ) -> CaptureResult<()> {
        self.run(|| std::thread::sleep(duration), target, strategy)
    }
}

fn invoke<T, E, F>(operation: F) -> CaptureResult<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(value)) => CaptureResult::Completed(value),
        Ok(Err(e)) => {
            error!("Operation failed: {}", e);
            CaptureResult::Failed(e.to_string())
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!("Operation panicked: {}", reason);
            CaptureResult::Failed(reason)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}

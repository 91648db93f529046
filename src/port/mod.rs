//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait, the real and mock implementations, device
//! discovery, and the shared handle the capture threads read through.

pub mod discovery;
pub mod error;
pub mod mock;
pub mod shared;
pub mod sync_port;
pub mod traits;

pub use discovery::{PortDescriptor, PortIdentifier};
pub use error::PortError;
pub use mock::{MockConnector, MockSerialPort};
pub use shared::SharedPort;
pub use sync_port::*;
pub use traits::*;

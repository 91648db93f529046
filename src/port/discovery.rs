//! Device identification and description lookup.
//!
//! A port can be named by its system path (`/dev/ttyUSB0`, `COM3`) or by a
//! human-readable description such as `"CP2102"` or `"Silicon Labs"`. A
//! description is matched against the descriptive text of every attached
//! device; the first device whose text contains it (case-insensitively) wins.

use super::error::PortError;
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};
use std::fmt;
use tracing::debug;

/// How the caller names the device to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortIdentifier {
    /// An explicit device path, used as-is.
    Path(String),
    /// A description to resolve against attached devices.
    Description(String),
}

impl PortIdentifier {
    /// Classify a user-supplied string.
    ///
    /// Anything that looks like a device path (absolute path, Windows device
    /// namespace, or `COMn`) is a path; everything else is a description.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if looks_like_path(raw) {
            Self::Path(raw.to_string())
        } else {
            Self::Description(raw.to_string())
        }
    }

    /// Resolve to a device path, scanning attached devices when needed.
    pub fn resolve(&self) -> Result<String, PortError> {
        match self {
            Self::Path(path) => Ok(path.clone()),
            Self::Description(needle) => {
                let ports = list_ports()?;
                find_by_description(&ports, needle)
                    .map(|p| p.port_name.clone())
                    .ok_or_else(|| PortError::not_found(needle.clone()))
            }
        }
    }
}

impl fmt::Display for PortIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Description(desc) => write!(f, "\"{desc}\""),
        }
    }
}

fn looks_like_path(raw: &str) -> bool {
    if raw.starts_with('/') || raw.starts_with(r"\\.\") {
        return true;
    }
    let upper = raw.to_ascii_uppercase();
    upper
        .strip_prefix("COM")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// An attached device and the text a description is matched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub port_name: String,
    pub description: String,
}

impl From<&SerialPortInfo> for PortDescriptor {
    fn from(info: &SerialPortInfo) -> Self {
        Self {
            port_name: info.port_name.clone(),
            description: describe(info),
        }
    }
}

/// Build the descriptive text for one device.
pub fn describe(info: &SerialPortInfo) -> String {
    let mut parts: Vec<String> = Vec::new();
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            parts.extend(usb.product.iter().cloned());
            parts.extend(usb.manufacturer.iter().cloned());
            parts.extend(usb.serial_number.iter().map(|s| format!("SN {s}")));
            parts.push(format!("USB VID:PID={:04x}:{:04x}", usb.vid, usb.pid));
        }
        SerialPortType::PciPort => parts.push("PCI".to_string()),
        SerialPortType::BluetoothPort => parts.push("Bluetooth".to_string()),
        SerialPortType::Unknown => {}
    }
    parts.push(format!("({})", info.port_name));
    parts.join(" ")
}

/// First device whose description contains `needle`, ignoring case.
pub fn find_by_description<'a>(
    ports: &'a [PortDescriptor],
    needle: &str,
) -> Option<&'a PortDescriptor> {
    let needle = needle.to_lowercase();
    ports
        .iter()
        .find(|p| p.description.to_lowercase().contains(&needle))
}

/// List attached serial devices.
pub fn list_ports() -> Result<Vec<PortDescriptor>, PortError> {
    let ports = serialport::available_ports()?;
    debug!("Found {} serial device(s)", ports.len());
    Ok(ports.iter().map(PortDescriptor::from).collect())
}

//! Unified error type for the gcadapter-lib crate.
//!
//! [`GcAdapterError`] wraps the transport-level `DeviceError` and
//! domain-specific error kinds. `From` impls allow `?` to propagate across
//! module boundaries seamlessly.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for gcadapter-lib operations.
#[derive(Debug)]
pub enum GcAdapterError {
    /// Transport error (enumerate, open, claim, transfer).
    Device(DeviceError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration error.
    Config(String),
}

impl fmt::Display for GcAdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcAdapterError::Device(e) => write!(f, "{e}"),
            GcAdapterError::Io(e) => write!(f, "I/O error: {e}"),
            GcAdapterError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for GcAdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GcAdapterError::Device(e) => Some(e),
            GcAdapterError::Io(e) => Some(e),
            GcAdapterError::Config(_) => None,
        }
    }
}

impl From<DeviceError> for GcAdapterError {
    fn from(e: DeviceError) -> Self {
        GcAdapterError::Device(e)
    }
}

impl From<std::io::Error> for GcAdapterError {
    fn from(e: std::io::Error) -> Self {
        GcAdapterError::Io(e)
    }
}

/// Crate-level Result alias using [`GcAdapterError`].
pub type Result<T> = std::result::Result<T, GcAdapterError>;

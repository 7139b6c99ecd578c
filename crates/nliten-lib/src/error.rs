//! Unified error type for the nliten-lib crate.
//!
//! [`NlitenError`] wraps module-specific errors (`DeviceError`, `ApiError`)
//! and the string-carrying kinds (`Config`, `Color`, `Time`).
//! `From` impls let `?` cross module boundaries.

use std::fmt;

use crate::api::ApiError;
use crate::device::DeviceError;

#[derive(Debug)]
pub enum NlitenError {
    /// Status light communication error (open, report I/O).
    Device(DeviceError),
    /// Enlighten REST API error.
    Api(ApiError),
    /// Standard I/O error (config file, log file).
    Io(std::io::Error),
    /// Configuration loading or validation error.
    Config(String),
    /// Color parsing error.
    Color(String),
    /// User-supplied time could not be parsed.
    Time(String),
}

impl fmt::Display for NlitenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NlitenError::Device(e) => write!(f, "{e}"),
            NlitenError::Api(e) => write!(f, "{e}"),
            NlitenError::Io(e) => write!(f, "I/O error: {e}"),
            NlitenError::Config(e) => write!(f, "Config error: {e}"),
            NlitenError::Color(e) => write!(f, "Color error: {e}"),
            NlitenError::Time(e) => write!(f, "Time error: {e}"),
        }
    }
}

impl std::error::Error for NlitenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NlitenError::Device(e) => Some(e),
            NlitenError::Api(e) => Some(e),
            NlitenError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for NlitenError {
    fn from(e: DeviceError) -> Self {
        NlitenError::Device(e)
    }
}

impl From<ApiError> for NlitenError {
    fn from(e: ApiError) -> Self {
        NlitenError::Api(e)
    }
}

impl From<std::io::Error> for NlitenError {
    fn from(e: std::io::Error) -> Self {
        NlitenError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, NlitenError>;

//! Unified error types for platio
//!
//! The library reports a closed set of failures through [`PioError`].
//! Backend failures carry an [`ErrorCode`] plus the backend's own text.
//! Uses thiserror for ergonomic error definitions.

use crate::domain::MetricKind;
use std::fmt;
use thiserror::Error;

/// Errors returned by every platform access operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PioError {
    /// Unknown domain name, domain type out of range, or domain index out of range
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Signal or control name not present in the catalog
    #[error("Unknown {kind}: {name}")]
    UnknownMetric { kind: MetricKind, name: String },

    /// Handle never issued by this batch session or invalidated by a reset
    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle { kind: MetricKind, index: usize },

    /// Sample requested before a batch read covered the handle
    #[error("Signal handle {0} has not been read by a batch read yet")]
    StaleHandle(usize),

    /// Restore requested without a prior save
    #[error("No saved control state to restore")]
    EmptyStack,

    /// Failure reported by the platform backend
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Unrecognized display format policy
    #[error("Unknown format type: {0}")]
    UnknownFormat(i32),

    /// Name or text exceeds the supported length
    #[error("{what} exceeds the maximum length of {max} bytes")]
    TooLong { what: String, max: usize },
}

/// Failure reported by a platform backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Error class
    pub code: ErrorCode,
    /// Diagnostic text from the backend
    pub message: String,
}

impl BackendError {
    /// Create a new backend error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    /// Generic runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Runtime, message)
    }

    /// Operation the backend does not provide
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }
}

/// Numeric error classes shared with the platform library
///
/// Negative values mirror the library's error enumeration. Anything else is
/// treated as an operating system errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Runtime,
    Logic,
    Invalid,
    FileParse,
    LevelRange,
    NotImplemented,
    PlatformUnsupported,
    MsrOpen,
    MsrRead,
    MsrWrite,
    AgentUnsupported,
    Affinity,
    NoAgent,
    DataStore,
    /// Operating system errno (always positive)
    Os(i32),
}

impl ErrorCode {
    /// Convert a raw return code into an error class
    ///
    /// Zero maps to `Runtime`, matching the library's treatment of an
    /// unspecified failure.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 | -1 => Self::Runtime,
            -2 => Self::Logic,
            -3 => Self::Invalid,
            -4 => Self::FileParse,
            -5 => Self::LevelRange,
            -6 => Self::NotImplemented,
            -7 => Self::PlatformUnsupported,
            -8 => Self::MsrOpen,
            -9 => Self::MsrRead,
            -10 => Self::MsrWrite,
            -11 => Self::AgentUnsupported,
            -12 => Self::Affinity,
            -13 => Self::NoAgent,
            -14 => Self::DataStore,
            other => Self::Os(other.saturating_abs()),
        }
    }

    /// Raw return code for this class
    pub fn as_raw(&self) -> i32 {
        match self {
            Self::Runtime => -1,
            Self::Logic => -2,
            Self::Invalid => -3,
            Self::FileParse => -4,
            Self::LevelRange => -5,
            Self::NotImplemented => -6,
            Self::PlatformUnsupported => -7,
            Self::MsrOpen => -8,
            Self::MsrRead => -9,
            Self::MsrWrite => -10,
            Self::AgentUnsupported => -11,
            Self::Affinity => -12,
            Self::NoAgent => -13,
            Self::DataStore => -14,
            Self::Os(errno) => *errno,
        }
    }

    /// Fixed message text for this class
    pub fn message(&self) -> String {
        let text = match self {
            Self::Runtime => "Runtime error",
            Self::Logic => "Logic error",
            Self::Invalid => "Invalid argument",
            Self::FileParse => "Unable to parse input file",
            Self::LevelRange => "Control hierarchy level is out of range",
            Self::NotImplemented => "Feature not yet implemented",
            Self::PlatformUnsupported => "Current platform not supported or unrecognized",
            Self::MsrOpen => "Could not open MSR device",
            Self::MsrRead => "Could not read from MSR device",
            Self::MsrWrite => "Could not write to MSR device",
            Self::AgentUnsupported => "Specified Agent not supported or unrecognized",
            Self::Affinity => "MPI ranks are not affinitized to distinct CPUs",
            Self::NoAgent => "Requested agent is unavailable or invalid",
            Self::DataStore => "Encountered a data store error",
            Self::Os(errno) => return std::io::Error::from_raw_os_error(*errno).to_string(),
        };
        text.to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Render the message for a raw return code
pub fn error_message(code: i32) -> String {
    ErrorCode::from_raw(code).message()
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from platform access
    #[error("{0}")]
    Pio(#[from] PioError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed command-line request
    #[error("{0}")]
    Usage(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Pio(PioError::Backend(err))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for platform access operations
pub type PioResult<T> = std::result::Result<T, PioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for raw in -14..=-1 {
            assert_eq!(ErrorCode::from_raw(raw).as_raw(), raw);
        }
    }

    #[test]
    fn test_error_code_zero_is_runtime() {
        assert_eq!(ErrorCode::from_raw(0), ErrorCode::Runtime);
    }

    #[test]
    fn test_error_code_unknown_is_errno() {
        assert_eq!(ErrorCode::from_raw(-22), ErrorCode::Os(22));
        assert_eq!(ErrorCode::from_raw(13), ErrorCode::Os(13));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(-3), "Invalid argument");
        assert_eq!(error_message(-7), "Current platform not supported or unrecognized");
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::invalid("geopm_pio_read_signal() failed");
        assert_eq!(
            err.to_string(),
            "Invalid argument: geopm_pio_read_signal() failed"
        );
    }

    #[test]
    fn test_unknown_metric_display() {
        let err = PioError::UnknownMetric {
            kind: MetricKind::Control,
            name: "BOGUS".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown control: BOGUS");
    }

    #[test]
    fn test_error_conversion() {
        let app_err: AppError = BackendError::runtime("boom").into();
        assert!(matches!(app_err, AppError::Pio(PioError::Backend(_))));
    }
}

//! Error types for the hardware tag layer.
//!
//! `McsError` is the single error type returned by the mapping service, the
//! tag cache and the communication orchestrator. It is built with `thiserror`
//! and groups failures by how a caller is expected to react:
//!
//! - **`Validation`**: the caller supplied a bad tag path or value. Always
//!   recoverable by correcting the input. The cache is never mutated when this
//!   error is returned.
//! - **`NotFound`**: a symbolic path or native address has no mapping.
//! - **`Hardware`**: a transport-level failure (connection refused, timeout,
//!   malformed response). Propagated unchanged; this layer never retries.
//! - **`Service`**: lifecycle misuse, e.g. reading from a stopped cache.
//! - **`Config`**: a tag or hardware document is structurally invalid.

use crate::client::Transport;
use thiserror::Error;

// =============================================================================
// Hardware Errors
// =============================================================================

/// What went wrong at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareErrorKind {
    Connection,
    Timeout,
    Protocol,
    NotConnected,
    InvalidAddress,
    ReadOnly,
    Io,
}

impl std::fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HardwareErrorKind::Connection => "connection",
            HardwareErrorKind::Timeout => "timeout",
            HardwareErrorKind::Protocol => "protocol",
            HardwareErrorKind::NotConnected => "not_connected",
            HardwareErrorKind::InvalidAddress => "invalid_address",
            HardwareErrorKind::ReadOnly => "read_only",
            HardwareErrorKind::Io => "io",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{transport} transport {kind} error: {message}")]
pub struct HardwareError {
    pub transport: Transport,
    pub kind: HardwareErrorKind,
    pub message: String,
}

impl HardwareError {
    pub fn new(transport: Transport, kind: HardwareErrorKind, message: impl Into<String>) -> Self {
        Self {
            transport,
            kind,
            message: message.into(),
        }
    }

    pub fn not_connected(transport: Transport) -> Self {
        Self::new(
            transport,
            HardwareErrorKind::NotConnected,
            "client is not connected",
        )
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// The rule a value or path violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("tag not in cache: {0}")]
    UnknownTag(String),

    #[error("tag {path} expects a {expected} value, got {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("tag {path} value {value} is below minimum {min}")]
    BelowMinimum { path: String, value: f64, min: f64 },

    #[error("tag {path} value {value} is above maximum {max}")]
    AboveMaximum { path: String, value: f64, max: f64 },

    #[error("tag {path} value '{value}' is not one of {options:?}")]
    NotAnOption {
        path: String,
        value: String,
        options: Vec<String>,
    },

    #[error("tag {0} is read-only")]
    ReadOnly(String),

    #[error("configuration section '{0}' is empty")]
    EmptyConfig(String),
}

// =============================================================================
// Application Error
// =============================================================================

/// Convenience alias for results using the tag layer error type.
pub type McsResult<T> = std::result::Result<T, McsError>;

/// Primary error type for the hardware tag layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McsError {
    /// Bad tag path or value. The cache is left unchanged.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown symbolic path or native address.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure from a hardware client.
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// Component used outside its running window.
    #[error("Service error: {0}")]
    Service(String),

    /// Tag or hardware document cannot be trusted.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl McsError {
    /// Returns true for errors the caller can fix by correcting its input.
    pub fn is_validation(&self) -> bool {
        matches!(self, McsError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, McsError::NotFound(_))
    }
}

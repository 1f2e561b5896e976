//! Unified error handling for SimWire
//!
//! This module provides a centralized error type for the whole transport,
//! ensuring consistent error handling across all components. Errors only
//! occur during session setup and teardown; steady-state queue operations
//! report backpressure through `Option` and never construct errors.

use thiserror::Error;

/// Main error type for SimWire operations
#[derive(Debug, Error)]
pub enum SimWireError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared memory region errors
    #[error("Memory error: {0}")]
    Memory(String),

    /// Queue geometry and region layout errors
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Rendezvous and introduction exchange errors
    #[error("Handshake error: {0}")]
    Handshake(String),
}

/// Convenience type alias for Results using SimWireError
pub type SimWireResult<T> = std::result::Result<T, SimWireError>;

/// Short alias used inside the crate; equivalent to `SimWireResult<T>`
pub type Result<T> = SimWireResult<T>;

impl From<toml::de::Error> for SimWireError {
    fn from(err: toml::de::Error) -> Self {
        SimWireError::Config(format!("TOML parse error: {}", err))
    }
}

// Helper methods
impl SimWireError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SimWireError::Config(msg.into())
    }

    /// Create a memory error
    pub fn memory<S: Into<String>>(msg: S) -> Self {
        SimWireError::Memory(msg.into())
    }

    /// Create a geometry error
    pub fn geometry<S: Into<String>>(msg: S) -> Self {
        SimWireError::Geometry(msg.into())
    }

    /// Create a handshake error
    pub fn handshake<S: Into<String>>(msg: S) -> Self {
        SimWireError::Handshake(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SimWireError = io_err.into();
        assert!(matches!(err, SimWireError::Io(_)));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            SimWireError::config("bad"),
            SimWireError::Config(_)
        ));
        assert!(matches!(
            SimWireError::geometry("bad"),
            SimWireError::Geometry(_)
        ));
        assert!(matches!(
            SimWireError::handshake("bad"),
            SimWireError::Handshake(_)
        ));
    }
}

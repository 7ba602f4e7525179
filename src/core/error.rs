use std::io;
use thiserror::Error;

use crate::protocol::FrameError;

/// Error types for the ranging core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    Malformed(#[from] FrameError),

    #[error("Frame not addressed to this node")]
    AddressMismatch,

    #[error("Ranging exchange timed out")]
    ExchangeTimeout,

    #[error("Peer table full")]
    CapacityExceeded,

    #[error("Radio error: {0}")]
    Radio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service error: {0}")]
    Service(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new radio driver error
    pub fn radio(msg: impl Into<String>) -> Self {
        Error::Radio(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Creates a new service error
    pub fn service(msg: impl Into<String>) -> Self {
        Error::Service(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::radio("spi timeout");
        assert!(matches!(err, Error::Radio(_)));
        assert_eq!(err.to_string(), "Radio error: spi timeout");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = FrameError::Empty.into();
        assert!(matches!(err, Error::Malformed(FrameError::Empty)));
    }
}

//! Common error types for catmig

use thiserror::Error;

/// Common result type for catmig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by configuration loading and the record codecs
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record bytes or markup could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Record content the target format cannot represent
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

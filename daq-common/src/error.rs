//! Common error types for DAQ services

use thiserror::Error;

/// Common result type for DAQ operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across DAQ services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error on a persisted document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File lock could not be acquired
    #[error("Lock error: {0}")]
    Lock(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

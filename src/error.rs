//! Error types and handling for pullstream
//!
//! This module provides the error values that flow through `on_error`
//! signals, including the structural errors the switch operator synthesizes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Main error type for pullstream operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamError {
    /// I/O related errors
    IO(String),
    /// Operation was cancelled
    Cancelled,
    /// An alternative slot resolved to no publisher
    NullAlternative,
    /// The alternative sequence failed to produce its next element
    Iteration(String),
    /// Custom error with message
    Custom(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::IO(msg) => write!(f, "IO error: {}", msg),
            StreamError::Cancelled => write!(f, "Operation cancelled"),
            StreamError::NullAlternative => write!(f, "The alternative publisher is null"),
            StreamError::Iteration(msg) => write!(f, "Alternative iteration failed: {}", msg),
            StreamError::Custom(msg) => write!(f, "Stream error: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IO(err.to_string())
    }
}

/// Result type for pullstream operations
pub type StreamResult<T> = Result<T, StreamError>;

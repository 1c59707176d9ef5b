//! Common error types for the clip bundler

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for bundler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared by every bundler stage
#[derive(Error, Debug)]
pub enum Error {
    /// Row source query or connection error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote object storage request failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A required directory could not be created
    #[error("Cannot create directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External helper exited non-zero or printed unusable output
    #[error("External tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Archive stream could not be produced
    #[error("Archive error: {0}")]
    Archive(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an external tool failure
    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

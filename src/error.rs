//! Error types for the ingestion core
//!
//! Row-level problems are never errors: they are collected as
//! [`RecordError`](crate::result::RecordError) data on the result. This enum
//! only covers failures that stop a parse or reject a caller's arguments.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Source file could not be read, decoded or split into rows
    #[error("{message}")]
    Parse { message: String },

    /// Caller supplied options outside their allowed ranges
    #[error("Invalid ingestion options: {message}")]
    InvalidOptions { message: String },

    /// Neither a file path nor file content was provided
    #[error("Either a file path or file content must be provided")]
    MissingSource,

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an invalid options error
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

impl From<csv::Error> for IngestError {
    fn from(error: csv::Error) -> Self {
        Self::Parse {
            message: format!("Malformed CSV: {}", error),
        }
    }
}

//! # Centralized Error Handling
//!
//! One error enum for the whole crate. Worker threads report through the
//! same type, so the first error latched by the pipeline is exactly what the
//! caller sees.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// Block buffers, sample-major rows or tables could not be sized
    #[error("Out of memory: {what} needs {needed} bytes, limit is {limit} bytes")]
    OutOfMemory {
        what: String,
        needed: usize,
        limit: usize,
    },

    /// An input or output file could not be opened
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed source record
    #[error("Read failed at variant {variant}: {message}")]
    ReadFailed { variant: usize, message: String },

    /// Output write failure
    #[error("Write failed: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// A worker thread could not be spawned
    #[error("Failed to create worker thread: {0}")]
    ThreadCreateFailed(#[source] std::io::Error),

    /// Format cannot represent the requested data
    #[error("Unsupported configuration: {message}")]
    UnsupportedConfiguration { message: String },

    /// Input data contradicts what the format requires
    #[error("Inconsistent input{}: {message}", variant_suffix(.variant))]
    InconsistentInput {
        variant: Option<String>,
        message: String,
    },

    /// Output would overflow a length or count field of the format
    #[error("Format limit exceeded: {message}")]
    FormatLimit { message: String },

    /// Invalid command-line or library options
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Parse errors in text inputs (.bim, .fam, ID lists)
    #[error("Parse error in {file} at line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
}

fn variant_suffix(variant: &Option<String>) -> String {
    match variant {
        Some(id) => format!(" at variant '{}'", id),
        None => String::new(),
    }
}

/// Type alias for Results using ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

impl ExportError {
    pub fn out_of_memory(what: impl Into<String>, needed: usize, limit: usize) -> Self {
        Self::OutOfMemory {
            what: what.into(),
            needed,
            limit,
        }
    }

    pub fn open_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OpenFailed {
            path: path.into(),
            source,
        }
    }

    pub fn read_failed(variant: usize, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            variant,
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration {
            message: message.into(),
        }
    }

    /// Inconsistent input tied to a specific variant
    pub fn inconsistent(variant: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentInput {
            variant: Some(variant.into()),
            message: message.into(),
        }
    }

    pub fn format_limit(message: impl Into<String>) -> Self {
        Self::FormatLimit {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

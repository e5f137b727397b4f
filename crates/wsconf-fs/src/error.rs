//! Error types for wsconf-fs

use std::path::PathBuf;

/// Result type for wsconf-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wsconf-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {resource}")]
    FileNotFound { resource: String },

    #[error("Invalid resource '{input}': {message}")]
    InvalidResource { input: String, message: String },

    #[error("Resource {resource} does not map to a local file path")]
    NotAFilePath { resource: String },

    #[error("{resource} is not valid UTF-8")]
    InvalidUtf8 { resource: String },

    #[error("No file system provider registered for scheme '{scheme}'")]
    NoProvider { scheme: String },

    #[error("Failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the resource simply does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileNotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

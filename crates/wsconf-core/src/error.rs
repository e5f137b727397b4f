//! Error types for wsconf-core

use std::path::PathBuf;

use crate::editing::EditingErrorCode;

/// Result type for wsconf-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wsconf-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration write was rejected before touching any file
    #[error("{code}: {message}")]
    Editing {
        code: EditingErrorCode,
        message: String,
    },

    /// The workspace definition file could not be used
    #[error("Invalid workspace file {resource}: {message}")]
    InvalidWorkspace { resource: String, message: String },

    /// Service options file could not be read
    #[error("Invalid options at {path}: {message}")]
    InvalidOptions { path: PathBuf, message: String },

    /// Configuration cache failure
    #[error("Cache error: {message}")]
    Cache { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from wsconf-fs
    #[error(transparent)]
    Fs(#[from] wsconf_fs::Error),

    /// Model error from wsconf-model
    #[error(transparent)]
    Model(#[from] wsconf_model::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    pub fn editing(code: EditingErrorCode, message: impl Into<String>) -> Self {
        Self::Editing {
            code,
            message: message.into(),
        }
    }

    /// The editing error code, when this is a rejected write.
    pub fn editing_code(&self) -> Option<EditingErrorCode> {
        match self {
            Self::Editing { code, .. } => Some(*code),
            _ => None,
        }
    }
}

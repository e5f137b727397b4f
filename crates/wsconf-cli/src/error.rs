//! Error types for wsconf-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from wsconf-core
    #[error(transparent)]
    Core(#[from] wsconf_core::Error),

    /// Error from wsconf-fs
    #[error(transparent)]
    Fs(#[from] wsconf_fs::Error),

    /// Error from wsconf-model
    #[error(transparent)]
    Model(#[from] wsconf_model::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}

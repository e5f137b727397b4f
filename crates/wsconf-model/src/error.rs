//! Error types for wsconf-model

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse {name}: {message}")]
    Parse { name: String, message: String },

    #[error("Expected a JSON object in {name}")]
    NotAnObject { name: String },

    #[error("Invalid schema for '{key}': {message}")]
    InvalidSchema { key: String, message: String },

    #[error("Invalid configuration key '{key}'")]
    InvalidKey { key: String },

    #[error("Unknown configuration scope: {scope}")]
    UnknownScope { scope: String },

    #[error("Unknown configuration target: {target}")]
    UnknownTarget { target: String },
}

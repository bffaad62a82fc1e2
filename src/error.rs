//! Error types for scribed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScribedError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalid { key: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Model loading errors
    #[error("Model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Failed to load model: {message}")]
    ModelLoad { message: String },

    // Runtime inference errors
    #[error("No available contexts")]
    PoolExhausted,

    #[error("Inference failed: {message}")]
    Inference { message: String },

    #[error("Speech detection failed: {message}")]
    Detector { message: String },

    // Unknown or malformed client control frames; logged and ignored
    #[error("Protocol misuse: {message}")]
    Protocol { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScribedError>;

//! # Error Handling
//!
//! Crate-level error type for the outer surface: output encoding, file
//! writing and process handoff. Provider failures are described by
//! [`SecretsError`](crate::secrets::SecretsError) and wrapped here when they
//! cross into the entrypoints.

use crate::secrets::SecretsError;

/// Custom result type for vestibule operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vestibule
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output encoding errors
    #[error("Failed to encode secrets as {format}: {message}")]
    Serialization { format: String, message: String },

    /// Provider errors surfaced to the caller
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    /// Failed to hand control to the target command
    #[error("Exec failed: {0}")]
    Exec(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new serialization error
    pub fn serialization<F: Into<String>, M: Into<String>>(format: F, message: M) -> Self {
        Self::Serialization { format: format.into(), message: message.into() }
    }

    /// Create a new exec error
    pub fn exec<S: Into<String>>(message: S) -> Self {
        Self::Exec(message.into())
    }
}

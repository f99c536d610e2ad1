//! Error types for secret providers.

use thiserror::Error;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Coarse classification of a [`SecretsError`].
///
/// Callers decide severity from this rather than from error text: configuration
/// problems stop a provider from being constructed, everything else only drops
/// (part of) that provider's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing configuration. Fatal at construction time.
    Configuration,
    /// No usable credential, or the broker rejected the login.
    Authentication,
    /// Network failure, timeout or non-success HTTP status. Skip and log.
    Transient,
    /// The broker answered with a payload of the wrong shape. Skip and log.
    UnexpectedShape,
    /// Local file system failure.
    Io,
}

/// Errors that can occur while a provider gathers secrets.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid key-material path.
    #[error("Invalid secret key: {key} - {reason}")]
    InvalidKey { key: String, reason: String },

    /// Authentication with the broker failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The broker returned no data (or a blank token) where some was required.
    #[error("Empty response from {path}")]
    EmptyResponse { path: String },

    /// The broker returned neither the versioned nor the legacy shape.
    #[error("Unexpected response from {path}: {reason}")]
    UnexpectedResponse { path: String, reason: String },

    /// Nothing stored at the requested path.
    #[error("Secret not found: {path}")]
    NotFound { path: String },

    /// Non-success HTTP status from the broker.
    #[error("HTTP request to {path} failed with status {status}: {body}")]
    Http { path: String, status: u16, body: String },

    /// Failed to reach the broker.
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Base64 or similar decoding failure on returned material.
    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SecretsError {
    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into(), reason: reason.into() }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create an empty response error.
    pub fn empty_response(path: impl Into<String>) -> Self {
        Self::EmptyResponse { path: path.into() }
    }

    /// Create an unexpected response error.
    pub fn unexpected_response(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse { path: path.into(), reason: reason.into() }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    /// Create a decode error.
    pub fn decode(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode { what: what.into(), message: message.into() }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::InvalidKey { .. } => ErrorKind::Configuration,
            Self::AuthenticationFailed { .. } => ErrorKind::Authentication,
            Self::NotFound { .. } | Self::Http { .. } | Self::ConnectionFailed { .. } => {
                ErrorKind::Transient
            }
            Self::EmptyResponse { .. }
            | Self::UnexpectedResponse { .. }
            | Self::Decode { .. }
            | Self::SerializationError(_) => ErrorKind::UnexpectedShape,
            Self::IoError(_) => ErrorKind::Io,
        }
    }

    /// Whether this error should prevent a provider from being constructed.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

impl From<reqwest::Error> for SecretsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::unexpected_response(
                err.url().map(|u| u.path().to_string()).unwrap_or_default(),
                err.to_string(),
            )
        } else {
            Self::connection_failed(err.to_string())
        }
    }
}

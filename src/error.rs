//! Error types for the panel session manager

use thiserror::Error;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sign-in rejected; the message is meant for the sign-in form.
    #[error("{0}")]
    Credentials(String),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure of a shared in-flight request, observed by a joining caller.
    #[error("Shared request failed: {0}")]
    Shared(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

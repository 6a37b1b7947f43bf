//! # Error Handling
//!
//! This module defines the error type shared by every stage of an evaluation run.
//!
//! ## Error Categories:
//! - **Setup failures** (config, audio source, token, connect, handshake): fatal.
//!   They travel back to `main`, which turns them into a non-zero exit code.
//! - **Transport failures** during streaming: returned by the writer task only.
//!   The reader never returns them; it logs read errors and keeps going.
//!
//! ## Rust Concepts:
//! - **enum**: Each variant represents a different kind of failure
//! - **Display trait**: Defines how errors are formatted as strings
//! - **std::error::Error**: Lets `anyhow` (used by `main`) wrap our errors
//! - **From trait**: Enables automatic conversion with `?`

use std::fmt;

/// Custom error types for the evaluation client.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::Handshake("expected started ack".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Configuration file or environment variable problems
    Config(String),

    /// The audio file could not be opened or read
    AudioSource(String),

    /// The signing key was refused by the MAC implementation
    Signing(String),

    /// The token request never produced a response (DNS, TLS, connection refused...)
    TokenRequest(String),

    /// The token endpoint answered, but not with the success code
    TokenRejected {
        /// Value of the `code` field, empty when absent
        code: String,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// The WebSocket upgrade failed or was refused
    Connect(String),

    /// The first inbound frame was not a `started` acknowledgment
    Handshake(String),

    /// A send on the live connection failed
    Transport(String),

    /// An outbound message could not be encoded
    Serialization(String),

    /// One of the streaming tasks panicked or was cancelled
    Task(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::AudioSource(msg) => write!(f, "Audio source error: {}", msg),
            AppError::Signing(msg) => write!(f, "Request signing failed: {}", msg),
            AppError::TokenRequest(msg) => write!(f, "Token request failed: {}", msg),
            AppError::TokenRejected { code, body } => {
                write!(f, "Token request rejected (code {:?}): {}", code, body)
            }
            AppError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            AppError::Handshake(msg) => write!(f, "Handshake failed: {}", msg),
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            AppError::Task(msg) => write!(f, "Task error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Automatic conversion from configuration errors to AppError.
///
/// ## When this happens:
/// - config.toml file has invalid syntax
/// - An environment variable cannot be parsed into the target field type
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// JSON encoding only fails for outbound messages; inbound frames are
/// classified leniently and never produce this error.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(format!("JSON encoding error: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

//! Error types for telmux.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for telmux operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Establishing the remote connection failed
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Errors on an established connection
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid session settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while opening a session's connection.
///
/// A session is never registered when one of these is returned.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Remote host unreachable or refused the connection
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The connect attempt did not complete in time
    #[error("Connection to {host}:{port} timed out after {timeout:?}")]
    Timeout {
        host: String,
        port: u16,
        timeout: Duration,
    },
}

/// Errors on an established connection.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection is no longer usable
    #[error("Connection disconnected")]
    Disconnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session settings errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid value in the session builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Character encoding label not recognised
    #[error("Unknown character encoding '{label}'")]
    UnknownEncoding { label: String },
}

/// Result type alias using telmux's Error.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the sideband transport.

use thiserror::Error;

/// Result type alias for sideband operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tunneling through the chat transport.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed key or configuration value
    #[error("parse error: {0}")]
    Parse(String),

    /// Encryption failed (usually: no peer key configured yet)
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption or authentication failed (wrong key, tampered or
    /// misaddressed ciphertext). Never retried.
    #[error("decryption/authentication failed")]
    Decryption,

    /// Malformed message envelope (bad transport encoding, short body)
    #[error("malformed envelope: {0}")]
    Format(String),

    /// HTTP-level failure talking to the chat provider
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Chat provider returned a non-success status
    #[error("chat api error: status {0}")]
    Api(u16),

    /// The polling source gave up after its retry ceiling
    #[error("fetch retries exhausted")]
    RetriesExhausted,

    /// Unexpected message type or ordering. Session-local, non-fatal.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Operation attempted after shutdown
    #[error("connection closed")]
    Closed,

    /// Stream multiplexer failure
    #[error("multiplexer error: {0}")]
    Mux(String),

    /// Invalid configuration file
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Shorthand for an envelope format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Shorthand for a protocol violation.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}

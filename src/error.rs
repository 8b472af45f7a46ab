//! Error types for the relay
//!
//! Only setup failures (bind, dial, config) and accept-loop failures ever
//! reach the caller. Per-connection and per-message I/O problems are logged
//! where they happen.

use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Could not bind/listen on the configured address (fatal)
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not dial the relay (fatal)
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accept loop failed for a reason other than a deliberate stop
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config values are unusable
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Message enqueue errors
///
/// Occurs when the client tries to queue a line after it has been stopped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The outbound queue has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_address() {
        let err = RelayError::Bind {
            addr: "127.0.0.1:8080".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to listen on 127.0.0.1:8080"));
    }
}

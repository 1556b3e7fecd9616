//! Unified error types for the Mira workspace.
//!
//! [`DecodeError`] and [`TransportError`] are recovered inside the event
//! core (a frame is dropped, a connection is retried). [`MiraError`] wraps
//! them together with the configuration and I/O failures that surface at
//! the edges of the system.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one inbound frame into a container event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is not a well-formed JSON object of the expected shape.
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Description of what failed to parse.
        reason: String,
    },

    /// A required field is absent, null, or empty.
    #[error("frame is missing required field `{field}`")]
    MissingField {
        /// Wire name of the missing field.
        field: &'static str,
    },

    /// The `type` field names an event kind we do not know.
    #[error("unknown event kind: {kind}")]
    UnknownKind {
        /// The unrecognized wire value.
        kind: String,
    },
}

/// Failure of the streaming transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// The connection dropped without a closing handshake.
    #[error("connection closed abruptly: {message}")]
    AbruptClose {
        /// Underlying failure.
        message: String,
    },

    /// The peer violated the streaming protocol.
    #[error("protocol error: {message}")]
    Protocol {
        /// Underlying failure.
        message: String,
    },

    /// The event stream endpoint could not be derived.
    #[error("invalid endpoint URL {url}: {message}")]
    InvalidEndpoint {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MiraError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An inbound frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MiraError>;

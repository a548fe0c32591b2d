//! Error types for hostkeeper.
//!
//! Classified remote failures are not errors: they are
//! [`RemoteResult`](crate::outcome::RemoteResult) branches. The types here
//! cover defects and local failures only.

use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::Operation;
use crate::types::HostId;

/// A transport outcome the gateway could not classify.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP status outside the operation's expected set
    #[error("Unexpected status {status} from {operation}")]
    UnexpectedStatus { operation: Operation, status: u16 },

    /// 503 whose body did not name a known service
    #[error("Unknown unavailable service {body:?} reported by {operation}")]
    UnknownService { operation: Operation, body: String },

    /// Request never produced a response
    #[error("Transport error during {operation}: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    /// Success body did not match the expected payload
    #[error("Malformed {operation} response: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    /// Host identifier in a payload was not a UUID
    #[error("Invalid host identifier {value:?}: {source}")]
    InvalidIdentifier {
        value: String,
        #[source]
        source: uuid::Error,
    },

    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Credential store failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential store format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session controller failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Defect raised by the gateway
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The session was logged out or closed
    #[error("Session is closed")]
    Closed,

    /// Classified outcome the operation does not expect
    #[error("Unexpected {outcome} outcome from {operation}")]
    UnexpectedOutcome {
        operation: Operation,
        outcome: &'static str,
    },

    /// Fetched profile belongs to another host
    #[error("Fetched profile for {actual}, session belongs to {expected}")]
    ProfileMismatch { expected: HostId, actual: HostId },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

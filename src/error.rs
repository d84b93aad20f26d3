//! # Error
//!
//! Errors raised by the instrumentation itself, never by the wrapped handler

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No access token was configured, raised before anything is sent
    #[error("Missing SIGNALFX_AUTH_TOKEN")]
    MissingAccessToken,

    #[error("invalid SIGNALFX_SEND_TIMEOUT {0:?}")]
    InvalidSendTimeout(String),

    #[error("invalid dimension name {0:?}")]
    InvalidDimension(String),

    /// The `Location` label has no entry in the region table
    #[error("unknown Azure region {0:?}")]
    UnknownRegion(String),

    #[error("failed to encode datapoints: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("ingest request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ingest endpoint rejected datapoints with status {0}")]
    Rejected(http::StatusCode),

    #[error("failed to start ingest worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ingest session already stopped")]
    SessionStopped,

    #[error("ingest worker panicked")]
    WorkerPanicked,
}

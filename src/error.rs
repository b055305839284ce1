//! Error types for shotwire.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all shotwire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during socket or filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (job payloads and results).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (bad header, oversized payload, unexpected frame kind).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The job payload named an action this service does not define.
    #[error("No action defined: {0}")]
    NoAction(String),

    /// The job payload is missing the required `id` field.
    #[error("Job id required")]
    MissingId,

    /// The job has neither a `url` nor `content` to materialize one from.
    #[error("url not provided")]
    NoUrl,

    /// The readiness wait gave up before the target element appeared.
    #[error("Wrap element not found: {selector} (waited {waited_ms}ms)")]
    WaitTimeout { selector: String, waited_ms: u64 },

    /// A requested file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The rendering engine reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

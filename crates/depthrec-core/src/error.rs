//! Typed error definitions for the capture pipeline.
//!
//! [`DepthRecError`] wraps the component-level errors (schema, queue, I/O) so
//! that orchestration code can match on them, while still converting cleanly
//! into `anyhow::Error` at the binary boundary.

use thiserror::Error;

use crate::queue::EnqueueError;
use crate::validate::SchemaError;

/// Domain-specific errors for the capture and normalization pipeline.
#[derive(Debug, Error)]
pub enum DepthRecError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Inbound message failed JSON decoding.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound message decoded but does not match the expected envelope.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Hand-off to the writer was refused.
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    /// Filesystem failure. Never retried.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for DepthRecError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DepthRecError>;

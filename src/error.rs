//! Error types for the streaming client

use thiserror::Error;

use crate::protocol::Channel;

/// Streaming client errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("WebSocket connection error: {0}")]
    Connection(String),

    #[error("WebSocket transport error: {0}")]
    Transport(String),

    #[error("No pong or ping received within {elapsed_ms}ms, connection closed")]
    KeepaliveTimeout { elapsed_ms: u64 },

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Subscription to {channel} rejected: {reason}")]
    SubscriptionRejected { channel: Channel, reason: String },

    #[error("Timed out waiting for {channel} subscription response")]
    SubscriptionTimeout { channel: Channel },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Client is already started")]
    AlreadyStarted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StreamError {
    /// Whether the error ends the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::Connection(_)
                | StreamError::Transport(_)
                | StreamError::KeepaliveTimeout { .. }
                | StreamError::Authentication(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

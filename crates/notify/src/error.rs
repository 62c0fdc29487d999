//! Error types for alert delivery.

use thiserror::Error;

/// Errors that can occur when delivering an alert through a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Spawning the delivery helper failed
    #[error("Delivery command failed: {0}")]
    Command(#[from] std::io::Error),

    /// The remote side rejected the message
    #[error("Delivery rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

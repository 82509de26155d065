//! Messaging collaborator seam.
//!
//! A [`MessageSource`] yields inbound chat messages; a [`Reactions`] client
//! attaches status markers to them. The relay only needs these two
//! capabilities, so the chat service stays swappable (Discord is the one
//! implementation shipped).

pub mod discord;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the chat service. Never fatal for the relay.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

/// One chat message as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    /// True for the relay's own account and for other bot accounts.
    pub author_is_bot: bool,
    pub content: String,
}

/// Stream of inbound messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. `Ok(None)` means the source has ended.
    ///
    /// Errors are transient: the caller logs them and calls again.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, TransportError>;
}

/// Attaches emoji reactions to messages.
#[async_trait]
pub trait Reactions: Send + Sync {
    async fn react(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), TransportError>;
}

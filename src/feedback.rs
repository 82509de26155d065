//! Status markers on the originating chat message.

use std::sync::Arc;

use crate::messaging::{InboundMessage, Reactions};

/// Outcome indicator shown to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Pending,
    Success,
    Failure,
}

impl Marker {
    pub fn emoji(self) -> &'static str {
        match self {
            Marker::Pending => "⏳",
            Marker::Success => "✅",
            Marker::Failure => "❌",
        }
    }
}

/// Reacts to messages; failures are logged and swallowed.
pub struct FeedbackReporter<R> {
    reactions: Arc<R>,
}

impl<R> Clone for FeedbackReporter<R> {
    fn clone(&self) -> Self {
        Self {
            reactions: Arc::clone(&self.reactions),
        }
    }
}

impl<R: Reactions> FeedbackReporter<R> {
    pub fn new(reactions: Arc<R>) -> Self {
        Self { reactions }
    }

    /// Attaches `marker` to `message`. Never fails.
    pub async fn mark(&self, message: &InboundMessage, marker: Marker) {
        if let Err(e) = self
            .reactions
            .react(&message.channel_id, &message.id, marker.emoji())
            .await
        {
            log::warn!("feedback: could not add {marker:?} marker to {}: {e}", message.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::TransportError;
    use async_trait::async_trait;

    struct Refusing;

    #[async_trait]
    impl Reactions for Refusing {
        async fn react(&self, _: &str, _: &str, _: &str) -> Result<(), TransportError> {
            Err(TransportError::Api("403 Missing Permissions".into()))
        }
    }

    #[tokio::test]
    async fn reaction_failures_are_swallowed() {
        let reporter = FeedbackReporter::new(Arc::new(Refusing));
        let message = InboundMessage {
            id: "m".into(),
            channel_id: "c".into(),
            author_id: "a".into(),
            author_name: "alice".into(),
            author_is_bot: false,
            content: "1".into(),
        };
        // Completes without panicking or returning an error.
        reporter.mark(&message, Marker::Pending).await;
    }

    #[test]
    fn markers_are_distinct() {
        assert_ne!(Marker::Pending.emoji(), Marker::Success.emoji());
        assert_ne!(Marker::Success.emoji(), Marker::Failure.emoji());
    }
}

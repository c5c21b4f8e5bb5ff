//! Message types exchanged between the session and pipeline crates.

use serde::{Deserialize, Serialize};

/// Delivery class reported by the transport for an inbound message.
///
/// Only `Notify` (a fresh notification) is actionable; everything else is
/// replayed history or sync traffic and must never trigger a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Notify,
    Historical,
}

/// One inbound chat message as surfaced by the transport layer.
///
/// Consumed exactly once by the pipeline; never persisted.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Chat/peer identifier replies are addressed to.
    pub peer_id: String,
    /// Message text, if the message carried any. The transport already
    /// falls back from the plain body to the extended/styled body, so the
    /// core sees a single optional string.
    pub text: Option<String>,
    /// True when the transport flags the message as authored by our own
    /// account (echo of outgoing traffic).
    pub is_self_echo: bool,
    pub delivery: Delivery,
}

impl InboundMessage {
    /// A fresh notification-class text message.
    #[must_use]
    pub fn notify(peer_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            text: Some(text.into()),
            is_self_echo: false,
            delivery: Delivery::Notify,
        }
    }
}

/// Outbound reply payload sent back into the chat session.
#[derive(Debug, Clone)]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Image {
        bytes: Vec<u8>,
        mime_type: String,
        caption: String,
    },
}

impl OutboundPayload {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_constructor_sets_delivery() {
        let msg = InboundMessage::notify("123@s.whatsapp.net", "/help");
        assert_eq!(msg.delivery, Delivery::Notify);
        assert!(!msg.is_self_echo);
        assert_eq!(msg.text.as_deref(), Some("/help"));
    }

    #[test]
    fn delivery_serializes_snake_case() {
        let json = serde_json::to_string(&Delivery::Notify).unwrap();
        assert_eq!(json, "\"notify\"");
    }
}

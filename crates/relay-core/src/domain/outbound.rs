//! Outbound messages and where they go.

use serde::{Deserialize, Serialize};

use super::message::ConversationKind;

/// Where a reply is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReplyTarget {
    /// One-shot session webhook bound to the originating event.
    /// Only valid for a short window; used by the fast path and the slow-path ack.
    Session {
        webhook: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_user_id: Option<String>,
    },

    /// Active push through the persistent platform identity.
    /// Used for slow-path results once the session webhook has expired.
    Push {
        user_id: String,
        conversation_id: String,
        conversation_kind: ConversationKind,
    },
}

impl ReplyTarget {
    pub fn session(webhook: impl Into<String>, at_user_id: Option<String>) -> Self {
        Self::Session {
            webhook: webhook.into(),
            at_user_id: at_user_id.filter(|u| !u.is_empty()),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            ReplyTarget::Session { .. } => "session",
            ReplyTarget::Push { .. } => "push",
        }
    }
}

/// Plain text vs. rich (Markdown) text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Markdown,
}

/// A single platform message, already sized to fit the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text { content: String },
    Markdown { title: String, text: String },
}

impl OutboundMessage {
    pub fn kind(&self) -> ContentKind {
        match self {
            OutboundMessage::Text { .. } => ContentKind::Text,
            OutboundMessage::Markdown { .. } => ContentKind::Markdown,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text { content } => content,
            OutboundMessage::Markdown { text, .. } => text,
        }
    }
}

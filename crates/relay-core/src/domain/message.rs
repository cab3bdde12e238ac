//! Inbound chat messages.
//!
//! The platform pushes a loosely structured JSON callback. It is decoded once
//! at the edge into [`InboundMessage`], whose [`MessageContent`] carries only
//! the fields relevant to each message kind.

use serde::{Deserialize, Serialize};

use super::errors::RelayError;

/// Private (1:1) or group conversation. Decides which push API is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Private,
    Group,
}

/// Payload of an inbound message, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text.
    Text { text: String },

    /// A single picture, resolvable through the download API.
    Picture { download_code: String },

    /// A picture event that carried no download code.
    PictureMissing,

    /// Text interleaved with (at most one used) picture.
    RichText {
        text: String,
        download_code: Option<String>,
    },

    /// Any message type the relay does not handle (voice, file, ...).
    Unsupported { msg_type: String },
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Platform-issued id, used for deduplication. May be empty.
    pub message_id: String,
    pub sender_id: String,
    pub conversation_id: String,
    pub conversation_kind: ConversationKind,
    /// One-shot reply address, valid for a short window after the event.
    pub session_webhook: String,
    pub content: MessageContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload {
    #[serde(default)]
    msg_id: String,
    #[serde(default, rename = "msgtype")]
    msg_type: String,
    #[serde(default)]
    text: Option<TextPayload>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    sender_staff_id: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    conversation_type: Option<serde_json::Value>,
    #[serde(default)]
    session_webhook: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextPayload {
    #[serde(default)]
    content: String,
}

impl InboundMessage {
    /// Decode a robot callback body.
    pub fn from_callback(body: &[u8]) -> Result<Self, RelayError> {
        let payload: CallbackPayload = serde_json::from_slice(body)
            .map_err(|e| RelayError::invalid_event(format!("json decode: {e}")))?;
        Self::from_payload(payload)
    }

    /// Private chats reply to the sender; groups to the conversation.
    pub fn chat_id(&self) -> &str {
        match self.conversation_kind {
            ConversationKind::Private => &self.sender_id,
            ConversationKind::Group => &self.conversation_id,
        }
    }
}

impl InboundMessage {
    fn from_payload(p: CallbackPayload) -> Result<Self, RelayError> {
        let session_webhook = p
            .session_webhook
            .filter(|w| !w.is_empty())
            .ok_or_else(|| RelayError::invalid_event("missing sessionWebhook"))?;

        let sender_id = p
            .sender_staff_id
            .filter(|s| !s.is_empty())
            .or(p.sender_id)
            .unwrap_or_default();

        let conversation_kind = parse_conversation_kind(p.conversation_type.as_ref());

        let content = match p.msg_type.as_str() {
            "text" => MessageContent::Text {
                text: p.text.map(|t| t.content).unwrap_or_default().trim().to_string(),
            },
            "picture" => match p.content.as_ref().and_then(download_code_of) {
                Some(download_code) => MessageContent::Picture { download_code },
                None => MessageContent::PictureMissing,
            },
            "richText" => parse_rich_text(p.content.as_ref()),
            other => MessageContent::Unsupported {
                msg_type: other.to_string(),
            },
        };

        Ok(Self {
            message_id: p.msg_id,
            sender_id,
            conversation_id: p.conversation_id,
            conversation_kind,
            session_webhook,
            content,
        })
    }
}

/// `conversationType` arrives as `"1"`/`"2"` or as a bare number.
fn parse_conversation_kind(value: Option<&serde_json::Value>) -> ConversationKind {
    let is_group = value
        .and_then(|v| v.as_str().map(|s| s == "2").or_else(|| v.as_i64().map(|n| n == 2)))
        .unwrap_or(false);
    if is_group {
        ConversationKind::Group
    } else {
        ConversationKind::Private
    }
}

fn download_code_of(value: &serde_json::Value) -> Option<String> {
    value
        .get("downloadCode")
        .or_else(|| value.get("pictureDownloadCode"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn parse_rich_text(content: Option<&serde_json::Value>) -> MessageContent {
    let mut text = String::new();
    let mut download_code = None;

    let items = content
        .and_then(|c| c.get("richText"))
        .and_then(|r| r.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for item in items {
        match item.get("text") {
            Some(serde_json::Value::String(s)) => text.push_str(s),
            Some(serde_json::Value::Object(o)) => {
                if let Some(s) = o.get("content").and_then(|c| c.as_str()) {
                    text.push_str(s);
                }
            }
            _ => {}
        }
        if let Some(code) = download_code_of(item) {
            download_code = Some(code);
        }
    }

    MessageContent::RichText {
        text: text.trim().to_string(),
        download_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: serde_json::Value) -> Result<InboundMessage, RelayError> {
        InboundMessage::from_callback(v.to_string().as_bytes())
    }

    #[test]
    fn decodes_text_message() {
        let msg = decode(json!({
            "msgId": "m1",
            "msgtype": "text",
            "text": {"content": "  生成报告 for Acme Corp "},
            "senderStaffId": "staff-1",
            "senderId": "$:abc",
            "conversationId": "cid-1",
            "conversationType": "1",
            "sessionWebhook": "https://oapi.example/robot/sendBySession?session=x",
        }))
        .unwrap();

        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.sender_id, "staff-1");
        assert_eq!(msg.conversation_kind, ConversationKind::Private);
        assert_eq!(msg.chat_id(), "staff-1");
        assert_eq!(
            msg.content,
            MessageContent::Text {
                text: "生成报告 for Acme Corp".into()
            }
        );
    }

    #[test]
    fn decodes_picture_and_numeric_group_type() {
        let msg = decode(json!({
            "msgId": "m2",
            "msgtype": "picture",
            "content": {"downloadCode": "dl-1"},
            "senderId": "$:abc",
            "conversationId": "cid-group",
            "conversationType": 2,
            "sessionWebhook": "https://hook",
        }))
        .unwrap();

        assert_eq!(msg.sender_id, "$:abc");
        assert_eq!(msg.conversation_kind, ConversationKind::Group);
        assert_eq!(msg.chat_id(), "cid-group");
        assert_eq!(
            msg.content,
            MessageContent::Picture {
                download_code: "dl-1".into()
            }
        );
    }

    #[test]
    fn picture_without_download_code_is_still_an_event() {
        let msg = decode(json!({
            "msgId": "m2b",
            "msgtype": "picture",
            "content": {},
            "sessionWebhook": "https://hook",
        }))
        .unwrap();
        assert_eq!(msg.content, MessageContent::PictureMissing);

        let msg = decode(json!({
            "msgId": "m2c",
            "msgtype": "picture",
            "sessionWebhook": "https://hook",
        }))
        .unwrap();
        assert_eq!(msg.content, MessageContent::PictureMissing);
    }

    #[test]
    fn decodes_rich_text_with_both_item_shapes() {
        let msg = decode(json!({
            "msgId": "m3",
            "msgtype": "richText",
            "content": {"richText": [
                {"text": "看看这张图"},
                {"type": "picture", "downloadCode": "dl-2"},
                {"text": {"content": " 谢谢"}},
            ]},
            "sessionWebhook": "https://hook",
        }))
        .unwrap();

        assert_eq!(
            msg.content,
            MessageContent::RichText {
                text: "看看这张图 谢谢".into(),
                download_code: Some("dl-2".into()),
            }
        );
    }

    #[test]
    fn unknown_type_is_kept_as_unsupported() {
        let msg = decode(json!({
            "msgId": "m4",
            "msgtype": "audio",
            "sessionWebhook": "https://hook",
        }))
        .unwrap();

        assert_eq!(
            msg.content,
            MessageContent::Unsupported {
                msg_type: "audio".into()
            }
        );
    }

    #[test]
    fn missing_webhook_is_rejected() {
        let err = decode(json!({"msgId": "m5", "msgtype": "text"})).unwrap_err();
        assert!(err.to_string().contains("sessionWebhook"));
    }

    #[test]
    fn garbage_body_is_rejected() {
        assert!(InboundMessage::from_callback(b"not json").is_err());
    }
}

//! Turns an inbound message into an agent request or a direct reply.

use std::path::PathBuf;

use crate::domain::MessageContent;
use crate::ports::{ImageResolution, ImageResolver};

pub const IMAGE_FAILED_TEXT: &str = "图片下载失败，无法处理。";
pub const IMAGE_MISSING_TEXT: &str = "无法获取图片内容。";
pub const EMPTY_MESSAGE_TEXT: &str = "无法处理此消息。";

/// What the agent will be asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    /// User text without any image reference. Routing looks at this.
    pub text: String,
    pub image: Option<PathBuf>,
    /// Shown before the agent's reply, e.g. when an attachment was lost.
    pub notice: Option<String>,
}

impl AgentRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            notice: None,
        }
    }

    /// Prefix `reply` with the notice, if any.
    pub fn decorate(&self, reply: String) -> String {
        match &self.notice {
            Some(notice) => format!("{notice}\n\n{reply}"),
            None => reply,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    Ask(AgentRequest),
    /// Answer without calling the agent.
    Reply(String),
}

pub async fn prepare(content: &MessageContent, images: &dyn ImageResolver) -> Prepared {
    match content {
        MessageContent::Text { text } if text.is_empty() => {
            Prepared::Reply(EMPTY_MESSAGE_TEXT.to_owned())
        }
        MessageContent::Text { text } => Prepared::Ask(AgentRequest::text(text.clone())),

        MessageContent::Picture { download_code } => match images.resolve(download_code).await {
            ImageResolution::Available(path) => Prepared::Ask(AgentRequest {
                text: String::new(),
                image: Some(path),
                notice: None,
            }),
            ImageResolution::Unavailable => Prepared::Reply(IMAGE_FAILED_TEXT.to_owned()),
        },

        MessageContent::PictureMissing => {
            tracing::warn!("picture without download code");
            Prepared::Reply(IMAGE_MISSING_TEXT.to_owned())
        }

        MessageContent::RichText {
            text,
            download_code,
        } => {
            let Some(code) = download_code else {
                if text.is_empty() {
                    return Prepared::Reply(EMPTY_MESSAGE_TEXT.to_owned());
                }
                return Prepared::Ask(AgentRequest::text(text.clone()));
            };

            match (images.resolve(code).await, text.is_empty()) {
                (ImageResolution::Available(path), _) => Prepared::Ask(AgentRequest {
                    text: text.clone(),
                    image: Some(path),
                    notice: None,
                }),
                (ImageResolution::Unavailable, true) => {
                    Prepared::Reply(IMAGE_FAILED_TEXT.to_owned())
                }
                (ImageResolution::Unavailable, false) => {
                    tracing::warn!("image unavailable, continuing with text only");
                    Prepared::Ask(AgentRequest {
                        text: text.clone(),
                        image: None,
                        notice: Some(IMAGE_FAILED_TEXT.to_owned()),
                    })
                }
            }
        }

        MessageContent::Unsupported { msg_type } => {
            tracing::warn!(msg_type, "unsupported message type");
            Prepared::Reply(format!("暂不支持消息类型: {msg_type}"))
        }
    }
}

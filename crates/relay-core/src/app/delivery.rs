//! ResultDelivery - 返信の整形・分割・送信
//!
//! # フロー
//! 1. Markdown ならタイトルを導出
//! 2. `split_content` で断片化
//! 3. 断片を順番に送信（最初の失敗で中断）

use std::sync::Arc;

use crate::domain::{ContentKind, OutboundMessage, RelayError, ReplyTarget, RetryPolicy};
use crate::format::{MAX_MESSAGE_LENGTH, convert_to_markdown, split_content};
use crate::ports::MessageSender;

pub struct ResultDelivery {
    sender: Arc<dyn MessageSender>,
    max_len: usize,
}

impl ResultDelivery {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            sender,
            max_len: MAX_MESSAGE_LENGTH,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Messages `content` will be sent as.
    pub fn fragments(&self, content: &str, kind: ContentKind) -> Vec<OutboundMessage> {
        match kind {
            ContentKind::Text => split_content(content, self.max_len, kind)
                .into_iter()
                .map(|content| OutboundMessage::Text { content })
                .collect(),
            ContentKind::Markdown => {
                let (title, body) = convert_to_markdown(content, None);
                let parts = split_content(&body, self.max_len, kind);
                let total = parts.len();
                parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| OutboundMessage::Markdown {
                        title: if total > 1 && i > 0 {
                            format!("{title} ({}/{total})", i + 1)
                        } else {
                            title.clone()
                        },
                        text,
                    })
                    .collect()
            }
        }
    }

    /// Send `content` once, fragment by fragment. Returns the fragment count.
    pub async fn deliver(
        &self,
        target: &ReplyTarget,
        content: &str,
        kind: ContentKind,
    ) -> Result<usize, RelayError> {
        self.deliver_with_retry(target, content, kind, &RetryPolicy::none())
            .await
    }

    /// Like [`deliver`](Self::deliver), retrying each fragment on transient
    /// errors. Fragments already sent are never re-sent.
    pub async fn deliver_with_retry(
        &self,
        target: &ReplyTarget,
        content: &str,
        kind: ContentKind,
        retry: &RetryPolicy,
    ) -> Result<usize, RelayError> {
        let fragments = self.fragments(content, kind);
        let total = fragments.len();

        for (index, message) in fragments.iter().enumerate() {
            let mut attempts = 0;
            loop {
                attempts += 1;
                match self.sender.send(target, message).await {
                    Ok(()) => break,
                    Err(e) if e.is_transient() && retry.should_retry(attempts) => {
                        let delay = retry.next_delay(attempts);
                        tracing::warn!(
                            mode = target.mode(),
                            fragment = index + 1,
                            total,
                            attempts,
                            error = %e,
                            "send failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        tracing::error!(
                            mode = target.mode(),
                            fragment = index + 1,
                            total,
                            error = %e,
                            "send failed"
                        );
                        return Err(e);
                    }
                }
            }
        }

        tracing::debug!(mode = target.mode(), fragments = total, "delivered");
        Ok(total)
    }
}

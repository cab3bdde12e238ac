//! MessageSender port - プラットフォームへの送信
//!
//! 1 回の呼び出しで 1 メッセージを送る。分割とリトライは呼び出し側の責務。

use async_trait::async_trait;

use crate::domain::{OutboundMessage, RelayError, ReplyTarget};

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send one message. Reports the outcome of this single attempt.
    async fn send(&self, target: &ReplyTarget, message: &OutboundMessage) -> Result<(), RelayError>;
}

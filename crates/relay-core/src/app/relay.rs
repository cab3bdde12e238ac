//! Relay - 受信イベント 1 件の処理
//!
//! # フロー
//! 1. 重複排除（既出なら何もしない）
//! 2. 前処理（テキスト抽出・画像解決）
//! 3. ルーティング
//!    - fast: その場でエージェントを呼び、セッション webhook で返信
//!    - slow: タスク作成 → 受付メッセージ → dispatch → 結果は能動プッシュ

use std::sync::Arc;

use super::delivery::ResultDelivery;
use super::dispatcher::{Dispatcher, Work};
use super::preprocess::{AgentRequest, Prepared, prepare};
use crate::domain::{
    ContentKind, InboundMessage, NewTask, ReplyTarget, Route, TaskEvent, TaskId,
};
use crate::ports::{AgentClient, DedupFilter, EventSink, ImageResolver, RoutingPolicy, TaskStore};

pub const DEFAULT_ACK_TEXT: &str = "收到任务，正在处理中...\n\n请稍候，我会尽快返回结果。";

/// How an inbound event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Already seen; nothing was done.
    Duplicate,
    /// Answered on the session webhook.
    Replied,
    /// Queued as a background task; acknowledged on the session webhook.
    Dispatched(TaskId),
    /// The session webhook could not be reached.
    Undeliverable,
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Slow-path acknowledgement.
    pub ack_text: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            ack_text: DEFAULT_ACK_TEXT.into(),
        }
    }
}

pub struct Relay {
    pub(super) dedup: Arc<dyn DedupFilter>,
    pub(super) routing: Arc<dyn RoutingPolicy>,
    pub(super) agent: Arc<dyn AgentClient>,
    pub(super) images: Arc<dyn ImageResolver>,
    pub(super) store: Arc<dyn TaskStore>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) delivery: Arc<ResultDelivery>,
    pub(super) dispatcher: Dispatcher,
    pub(super) options: RelayOptions,
}

impl Relay {
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Handle one decoded callback event.
    pub async fn handle_event(&self, msg: InboundMessage) -> HandleOutcome {
        let msg_id = msg.message_id.as_str();
        if self.dedup.seen(msg_id) {
            tracing::info!(msg_id, "duplicate event ignored");
            return HandleOutcome::Duplicate;
        }

        let session = ReplyTarget::session(msg.session_webhook.clone(), Some(msg.sender_id.clone()));
        tracing::info!(
            msg_id,
            user_id = %msg.sender_id,
            conversation = ?msg.conversation_kind,
            "event received"
        );

        let request = match prepare(&msg.content, self.images.as_ref()).await {
            Prepared::Reply(text) => return self.reply(&msg, &session, &text).await,
            Prepared::Ask(request) => request,
        };

        match self.routing.classify(&request.text) {
            Route::Fast => {
                let reply = self
                    .agent
                    .chat(&request.text, request.image.as_deref())
                    .await;
                self.reply(&msg, &session, &request.decorate(reply)).await
            }
            Route::Slow => self.dispatch(&msg, &session, request).await,
        }
    }

    async fn reply(&self, msg: &InboundMessage, session: &ReplyTarget, text: &str) -> HandleOutcome {
        match self.delivery.deliver(session, text, ContentKind::Text).await {
            Ok(_) => HandleOutcome::Replied,
            Err(e) => {
                tracing::error!(msg_id = %msg.message_id, error = %e, "event undeliverable");
                HandleOutcome::Undeliverable
            }
        }
    }

    async fn dispatch(
        &self,
        msg: &InboundMessage,
        session: &ReplyTarget,
        request: AgentRequest,
    ) -> HandleOutcome {
        let task_id = self
            .store
            .create(NewTask {
                user_id: msg.sender_id.clone(),
                conversation_id: msg.conversation_id.clone(),
                conversation_kind: msg.conversation_kind,
                reply_channel: msg.session_webhook.clone(),
                prompt: request.text.clone(),
            })
            .await;
        self.events.emit(TaskEvent::Created { task_id });
        tracing::info!(%task_id, msg_id = %msg.message_id, "slow path");

        let agent = Arc::clone(&self.agent);
        let work: Work = Box::pin(async move {
            let reply = agent.chat(&request.text, request.image.as_deref()).await;
            Ok(request.decorate(reply))
        });

        // Acknowledge first so the push can never overtake it.
        if let Err(e) = self
            .delivery
            .deliver(session, &self.options.ack_text, ContentKind::Text)
            .await
        {
            // The result still arrives by push.
            tracing::warn!(%task_id, error = %e, "acknowledgement not delivered");
        }

        if let Err(e) = self.dispatcher.dispatch(task_id, work) {
            self.store.fail(task_id, e.to_string()).await;
            tracing::error!(%task_id, error = %e, "dispatch rejected");
            return self.reply(msg, session, &format!("任务提交失败: {e}")).await;
        }
        HandleOutcome::Dispatched(task_id)
    }

    /// Stop background workers; queued and in-flight tasks finish first.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

//! EventSink port - イベント記録の抽象化
//!
//! - NoopEventSink: 何もしない
//! - BroadcastEventSink: tokio broadcast で購読者に配信（impls 側）

use crate::domain::TaskEvent;

/// EventSink はタスクイベントを記録
///
/// 呼び出し側をブロックしないこと（ワーカーから直接呼ばれる）。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TaskEvent) {}
}

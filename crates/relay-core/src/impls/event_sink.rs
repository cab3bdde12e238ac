//! BroadcastEventSink - tokio broadcast によるイベント配信
//!
//! 購読者がいなくても emit は失敗しない（イベントは捨てられる）。
//! 遅い購読者は Lagged を受け取る。

use tokio::sync::broadcast;

use crate::domain::TaskEvent;
use crate::ports::EventSink;

pub struct BroadcastEventSink {
    tx: broadcast::Sender<TaskEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: TaskEvent) {
        tracing::debug!(task_id = %event.task_id(), ?event, "task event");
        // no receivers is fine
        let _ = self.tx.send(event);
    }
}

//! Events - ドメインイベント
//!
//! タスクのライフサイクルで発生したイベント。EventSink 経由で配信され、
//! ログ出力やテストでの完了待ちに使われます。

use serde::{Deserialize, Serialize};

use super::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Created { task_id: TaskId },
    Started { task_id: TaskId },
    Completed { task_id: TaskId },
    Failed { task_id: TaskId, error: String },
    /// Final result could not be pushed to the user.
    DeliveryFailed { task_id: TaskId, error: String },
    /// Result was pushed (all fragments).
    Delivered { task_id: TaskId, fragments: usize },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Created { task_id }
            | TaskEvent::Started { task_id }
            | TaskEvent::Completed { task_id }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::DeliveryFailed { task_id, .. }
            | TaskEvent::Delivered { task_id, .. } => *task_id,
        }
    }

    /// No further events follow for this task.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TaskEvent::Delivered { .. } | TaskEvent::DeliveryFailed { .. }
        )
    }
}

//! TaskStore port - バックグラウンドタスクの正本（source of truth）
//!
//! # 設計原則
//! - タスクはプロセスメモリ上にのみ存在する（再起動で消える）
//! - 変更系の操作はストア単位で排他
//! - ネットワーク I/O 中にロックを保持しない（呼び出し側は clone を受け取る）

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{NewTask, TaskId, TaskRecord, TaskState};

/// Number of tasks per state, for status endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn in_flight(&self) -> usize {
        self.pending + self.processing
    }
}

/// Registry of task records keyed by task id.
///
/// Mutators return `false` when nothing changed: unknown id, or a transition
/// that would move the task backwards. Neither is an error for the caller.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Allocate a fresh id and insert a `Pending` record.
    async fn create(&self, task: NewTask) -> TaskId;

    async fn update_status(&self, task_id: TaskId, status: TaskState) -> bool;

    async fn complete(&self, task_id: TaskId, result: String) -> bool;

    async fn fail(&self, task_id: TaskId, error: String) -> bool;

    async fn get(&self, task_id: TaskId) -> Option<TaskRecord>;

    /// Remove every record older than `max_age`, whatever its state.
    /// Returns how many were removed.
    async fn sweep(&self, max_age: Duration) -> usize;

    async fn counts(&self) -> TaskCounts;
}

//! In-memory task store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{NewTask, TaskId, TaskRecord, TaskState, TransitionError};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskCounts, TaskStore, UlidGenerator};

/// Store state. Every record lives here and nowhere else.
#[derive(Default)]
struct InMemoryTaskStoreState {
    records: HashMap<TaskId, TaskRecord>,
}

impl InMemoryTaskStoreState {
    fn counts_by_state(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Processing => counts.processing += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Apply `f` to the record, logging unknown ids and rejected transitions.
    fn modify(
        &mut self,
        task_id: TaskId,
        op: &'static str,
        f: impl FnOnce(&mut TaskRecord) -> Result<(), TransitionError>,
    ) -> bool {
        let Some(record) = self.records.get_mut(&task_id) else {
            tracing::warn!(%task_id, op, "unknown task");
            return false;
        };
        match f(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%task_id, op, error = %e, "transition rejected");
                false
            }
        }
    }
}

/// Task store backed by a `HashMap` behind a single `RwLock`.
///
/// Mutations take the write lock; `get` and `counts` share the read lock.
/// No lock is held beyond the method call.
pub struct InMemoryTaskStore {
    state: RwLock<InMemoryTaskStoreState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: RwLock::new(InMemoryTaskStoreState::default()),
            clock,
            ids,
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: NewTask) -> TaskId {
        let task_id = self.ids.generate_task_id();
        let record = TaskRecord::new(task_id, task, self.clock.now());

        let mut state = self.state.write().await;
        state.records.insert(task_id, record);
        tracing::debug!(%task_id, total = state.records.len(), "task created");
        task_id
    }

    async fn update_status(&self, task_id: TaskId, status: TaskState) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.modify(task_id, "update_status", |r| r.mark(status, now))
    }

    async fn complete(&self, task_id: TaskId, result: String) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.modify(task_id, "complete", |r| r.mark_completed(result, now))
    }

    async fn fail(&self, task_id: TaskId, error: String) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.modify(task_id, "fail", |r| r.mark_failed(error, now))
    }

    async fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.state.read().await.records.get(&task_id).cloned()
    }

    async fn sweep(&self, max_age: Duration) -> usize {
        // An age too large for chrono never expires anything.
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return 0;
        };

        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|_, r| r.created_at >= cutoff);
        let removed = before - state.records.len();
        if removed > 0 {
            tracing::info!(removed, remaining = state.records.len(), "swept expired tasks");
        }
        removed
    }

    async fn counts(&self) -> TaskCounts {
        self.state.read().await.counts_by_state()
    }
}

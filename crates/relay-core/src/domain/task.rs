//! Task record: who asked, what they asked, and how far it got.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::ConversationKind;
use super::outbound::ReplyTarget;
use super::{TaskId, TaskState};

/// Everything the store needs to create a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub user_id: String,
    pub conversation_id: String,
    pub conversation_kind: ConversationKind,
    /// One-shot session webhook of the originating event.
    pub reply_channel: String,
    pub prompt: String,
}

/// A slow-path request tracked by the task store.
///
/// Design:
/// - The store owns every record; callers only ever see clones.
/// - State transitions happen through the `mark_*` methods, which refuse to
///   move backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub user_id: String,
    pub conversation_id: String,
    pub conversation_kind: ConversationKind,
    pub reply_channel: String,
    pub prompt: String,
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskState,
    pub to: TaskState,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, spec: NewTask, created_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            user_id: spec.user_id,
            conversation_id: spec.conversation_id,
            conversation_kind: spec.conversation_kind,
            reply_channel: spec.reply_channel,
            prompt: spec.prompt,
            state: TaskState::Pending,
            result: None,
            error: None,
            created_at,
            completed_at: None,
        }
    }

    fn transition(&mut self, to: TaskState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Move to `state`. Terminal states go through `mark_completed`/`mark_failed`
    /// so that the result and timestamp are recorded together.
    pub fn mark(&mut self, state: TaskState, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(state)?;
        if state.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn mark_completed(
        &mut self,
        result: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(TaskState::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(TaskState::Failed)?;
        self.error = Some(error);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Active-push address for this task's requester.
    ///
    /// The session webhook is short-lived, so background results always go
    /// through the persistent identity instead.
    pub fn push_target(&self) -> ReplyTarget {
        ReplyTarget::Push {
            user_id: self.user_id.clone(),
            conversation_id: self.conversation_id.clone(),
            conversation_kind: self.conversation_kind,
        }
    }

    /// Seconds between creation and completion, if completed.
    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0)
    }
}

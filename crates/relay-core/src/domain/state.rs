//! Task state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// TaskState はバックグラウンドタスクの状態を表現
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed
/// - Pending -> Failed (the worker could not even start the work)
///
/// No state is ever re-entered; terminal states have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, waiting for a worker.
    Pending,

    /// A worker is executing the deferred work.
    Processing,

    /// Work produced a result.
    Completed,

    /// Work raised an error.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Position in the lifecycle; transitions must strictly increase it.
    fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Processing => 1,
            TaskState::Completed | TaskState::Failed => 2,
        }
    }

    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Pending, TaskState::Processing, true)]
    #[case(TaskState::Pending, TaskState::Completed, true)]
    #[case(TaskState::Pending, TaskState::Failed, true)]
    #[case(TaskState::Processing, TaskState::Completed, true)]
    #[case(TaskState::Processing, TaskState::Failed, true)]
    #[case(TaskState::Pending, TaskState::Pending, false)]
    #[case(TaskState::Processing, TaskState::Pending, false)]
    #[case(TaskState::Processing, TaskState::Processing, false)]
    #[case(TaskState::Completed, TaskState::Failed, false)]
    #[case(TaskState::Failed, TaskState::Completed, false)]
    #[case(TaskState::Completed, TaskState::Processing, false)]
    fn transitions(#[case] from: TaskState, #[case] to: TaskState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn serializes_snake_case() {
        let s = serde_json::to_string(&TaskState::Processing).unwrap();
        assert_eq!(s, "\"processing\"");
    }
}

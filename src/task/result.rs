//! Result of one task attempt.
//!
//! Exactly one `TaskResult` is produced per attempted task, by the agent
//! that processed it; the agent's history ledger owns it until pruned.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TaskId;

/// Unique identifier for a result, distinct from the task it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(Uuid);

impl ResultId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of a task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
    TimedOut,
}

impl ResultStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ResultStatus::Completed)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultStatus::Completed => write!(f, "completed"),
            ResultStatus::Failed => write!(f, "failed"),
            ResultStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// The recorded outcome of attempting a task.
///
/// `task_id` is a back-reference, not ownership: the result outlives neither
/// the producing agent's history bound nor the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    id: ResultId,
    task_id: TaskId,
    status: ResultStatus,
    output: String,
    completed_at: DateTime<Utc>,
    execution_time: Option<Duration>,
}

impl TaskResult {
    /// Create a successful result carrying the produced output.
    pub fn completed(task_id: TaskId, output: impl Into<String>) -> Self {
        Self::new(task_id, ResultStatus::Completed, output)
    }

    /// Create a failed result; `output` carries the error text.
    pub fn failed(task_id: TaskId, output: impl Into<String>) -> Self {
        Self::new(task_id, ResultStatus::Failed, output)
    }

    /// Create a timed-out result for a task that exceeded its budget.
    pub fn timed_out(task_id: TaskId, budget: Duration) -> Self {
        Self::new(
            task_id,
            ResultStatus::TimedOut,
            format!("task did not complete within {budget:?}"),
        )
    }

    fn new(task_id: TaskId, status: ResultStatus, output: impl Into<String>) -> Self {
        Self {
            id: ResultId::new(),
            task_id,
            status,
            output: output.into(),
            completed_at: Utc::now(),
            execution_time: None,
        }
    }

    /// Attach the measured wall-clock execution time.
    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = Some(elapsed);
        self
    }

    /// Override the completion timestamp, for eviction-order tests.
    #[cfg(test)]
    pub(crate) fn with_completed_at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = completed_at;
        self
    }

    pub fn id(&self) -> ResultId {
        self.id
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn execution_time(&self) -> Option<Duration> {
        self.execution_time
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

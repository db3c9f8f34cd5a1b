//! Progress monitors for long-running tasks.
//!
//! Advisory only: updates never fail, unknown task ids are silently ignored,
//! and nothing here influences task execution or its outcome.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Point-in-time progress for one monitored task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    /// Free-text phase description ("loading model", "generating", ...).
    pub status: String,
    /// Completion fraction, always within [0.0, 1.0].
    pub progress: f32,
    /// Caller's estimate of the total runtime, if given.
    pub expected_duration: Option<Duration>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Clamp a raw progress value into [0.0, 1.0]. Non-finite input (NaN,
/// infinities) becomes 0.0 rather than poisoning the monitor.
fn clamp_progress(raw: f32) -> f32 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Registry of active monitors, keyed by task id.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    monitors: HashMap<TaskId, TaskProgress>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) the monitor for `task_id`.
    pub fn start(&mut self, task_id: TaskId, expected_duration: Option<Duration>) {
        let now = Utc::now();
        self.monitors.insert(
            task_id,
            TaskProgress {
                task_id,
                status: "started".to_string(),
                progress: 0.0,
                expected_duration,
                started_at: now,
                updated_at: now,
            },
        );
    }

    /// Update a monitor's status and completion fraction.
    ///
    /// Unknown ids are a silent no-op; the fraction is clamped to
    /// [0.0, 1.0].
    pub fn update(&mut self, task_id: TaskId, status: impl Into<String>, progress: f32) {
        if let Some(monitor) = self.monitors.get_mut(&task_id) {
            monitor.status = status.into();
            monitor.progress = clamp_progress(progress);
            monitor.updated_at = Utc::now();
        }
    }

    /// Current snapshot for a task; `None` when it was never monitored.
    pub fn get(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.monitors.get(&task_id).cloned()
    }

    /// Remove a monitor, returning its final snapshot.
    pub fn finish(&mut self, task_id: TaskId) -> Option<TaskProgress> {
        self.monitors.remove(&task_id)
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn clear(&mut self) {
        self.monitors.clear();
    }
}

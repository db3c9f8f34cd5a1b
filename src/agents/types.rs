//! Core agent types: identity, lifecycle state and errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::AdapterError;
use crate::capability::Capability;
use crate::task::TaskId;

/// Unique identifier for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Create a new unique agent ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::str::FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an agent.
///
/// # Invariants
/// - Exactly one state at a time; agents start `Idle` and end `Terminated`.
/// - The only mutation path is an explicit transition inside the owning
///   agent; every transition is recorded in its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    /// Ready to initialize or accept a task.
    Idle,
    /// Selecting and validating the default model.
    Initializing,
    /// Processing the named task (the most recently accepted one when
    /// several overlap).
    Busy { task_id: TaskId },
    /// A task or initialization failed; only shutdown leaves this state.
    Error { reason: String },
    /// Cleanup in progress.
    ShuttingDown,
    /// Final state; the agent accepts nothing further.
    Terminated,
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Busy { .. } => "busy",
            Self::Error { .. } => "error",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Whether `process_task` may accept work in this state. Busy windows
    /// may overlap, so a busy agent still accepts.
    pub fn accepts_tasks(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy { .. })
    }

    /// Whether `shutdown` may begin from this state.
    pub fn can_shut_down(&self) -> bool {
        matches!(self, Self::Idle | Self::Error { .. })
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One recorded lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: AgentState,
    pub to: AgentState,
    pub at: DateTime<Utc>,
}

/// Errors from agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent does not provide a capability the task requires. Raised
    /// before any state change.
    #[error("capability '{0}' not supported by this agent")]
    CapabilityNotSupported(Capability),

    /// The requested operation is not legal in the current state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },

    /// The task exceeded its processing budget.
    #[error("task {task_id} timed out after {timeout:?}")]
    Timeout { task_id: TaskId, timeout: Duration },

    /// The underlying adapter or backend failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(AgentState::Idle.accepts_tasks());
        assert!(AgentState::Busy { task_id: TaskId::new() }.accepts_tasks());
        assert!(!AgentState::Initializing.accepts_tasks());
        assert!(!AgentState::Error { reason: "boom".into() }.accepts_tasks());
        assert!(!AgentState::Terminated.accepts_tasks());

        assert!(AgentState::Idle.can_shut_down());
        assert!(AgentState::Error { reason: "boom".into() }.can_shut_down());
        assert!(!AgentState::Busy { task_id: TaskId::new() }.can_shut_down());
        assert!(!AgentState::Terminated.can_shut_down());
    }

    #[test]
    fn test_state_display_names() {
        assert_eq!(AgentState::Idle.to_string(), "idle");
        assert_eq!(AgentState::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(
            AgentState::Error { reason: "x".into() }.to_string(),
            "error"
        );
    }

    #[test]
    fn test_agent_ids_are_unique() {
        assert_ne!(AgentId::new(), AgentId::new());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AgentError::InvalidTransition {
            from: AgentState::Terminated,
            to: AgentState::Busy { task_id: TaskId::new() },
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition from terminated to busy"
        );
    }
}

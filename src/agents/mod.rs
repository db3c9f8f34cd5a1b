//! Agents: lifecycle state machine and task execution.
//!
//! An agent is the unit the dispatcher routes tasks to. It advertises a
//! capability set, walks a fixed lifecycle
//! (`Idle → Initializing → Idle → Busy → ... → Terminated`), and keeps a
//! bounded ledger of finished task results plus advisory progress monitors.
//!
//! [`ModelAgent`] is the one concrete implementation: it fronts a
//! [`crate::adapter::ModelAdapter`] and derives its capabilities from the
//! active model's family. Everything else (the dispatcher, tests) talks to
//! the [`Agent`] trait.

mod history;
mod model_agent;
mod progress;
mod types;

pub use history::TaskHistory;
pub use model_agent::ModelAgent;
pub use progress::{ProgressRegistry, TaskProgress};
pub use types::{AgentError, AgentId, AgentState, StateTransition};

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::CapabilitySet;
use crate::task::{Task, TaskResult};

/// Shared handle to a registered agent.
pub type AgentRef = Arc<dyn Agent>;

/// Base trait for all agents.
///
/// # Invariants
/// - `process_task` returns `Ok` only when the task actually completed; all
///   failures are returned as `Err`, never panicked.
/// - Capability checks happen before any state change, so a rejected task
///   leaves the agent exactly as it was.
/// - Exactly one `TaskResult` is recorded per accepted attempt.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique identifier of this agent.
    fn id(&self) -> AgentId;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Prepare the agent for work (select and validate its model).
    ///
    /// # Errors
    /// - [`AgentError::InvalidTransition`] unless the agent is `Idle`
    /// - [`AgentError::Adapter`] when preparation fails; the agent is left
    ///   in `Error`
    async fn initialize(&self) -> Result<(), AgentError>;

    /// Execute one task to completion.
    ///
    /// # Errors
    /// - [`AgentError::CapabilityNotSupported`] before any state change
    /// - [`AgentError::InvalidTransition`] when the agent cannot accept work
    /// - [`AgentError::Timeout`] when the task budget elapses
    /// - [`AgentError::Adapter`] for backend failures
    async fn process_task(&self, task: &Task) -> Result<TaskResult, AgentError>;

    /// Tear the agent down; terminal.
    ///
    /// # Errors
    /// [`AgentError::InvalidTransition`] unless the agent is `Idle` or in
    /// `Error`.
    async fn shutdown(&self) -> Result<(), AgentError>;

    /// Capabilities currently advertised. Empty until initialized.
    async fn capabilities(&self) -> CapabilitySet;

    /// Current lifecycle state.
    async fn state(&self) -> AgentState;
}

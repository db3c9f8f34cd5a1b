//! Task dispatch: capability matching and agent selection.
//!
//! The dispatcher owns the registered-agent set and routes each task to one
//! capable agent. Matching is pure set containment (every required
//! capability must be advertised); choosing among matches is delegated to an
//! injectable [`SelectionPolicy`]. Dispatch itself never mutates agent
//! state: a task that no agent can serve fails fast with
//! [`DispatchError::NoCapableAgent`] and leaves everything untouched.

use thiserror::Error;
use tokio::sync::RwLock;

use crate::agents::{AgentError, AgentId, AgentRef};
use crate::capability::{is_supported, CapabilitySet};
use crate::task::{Task, TaskResult};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered agent advertises every capability the task requires.
    #[error("no capable agent found for task")]
    NoCapableAgent,

    /// The chosen agent failed while processing; passed through unchanged.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Opaque registration receipt, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentHandle(AgentId);

impl AgentHandle {
    pub fn agent_id(&self) -> AgentId {
        self.0
    }
}

/// One capable agent as a selection policy sees it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: AgentId,
    pub capabilities: CapabilitySet,
}

/// Strategy for choosing among capable candidates.
///
/// `candidates` is non-empty, in registration order, and every entry already
/// satisfies the task's capability requirements. Returning `None` refuses
/// the dispatch.
pub trait SelectionPolicy: Send + Sync {
    fn select(&self, task: &Task, candidates: &[Candidate]) -> Option<usize>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Pick the earliest-registered capable agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCapable;

impl SelectionPolicy for FirstCapable {
    fn select(&self, _task: &Task, candidates: &[Candidate]) -> Option<usize> {
        (!candidates.is_empty()).then_some(0)
    }

    fn name(&self) -> &'static str {
        "first_capable"
    }
}

/// Pick the agent advertising the fewest capabilities, on the theory that a
/// narrow agent is the better fit for work it can do at all. Ties fall back
/// to registration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostSpecialized;

impl SelectionPolicy for MostSpecialized {
    fn select(&self, _task: &Task, candidates: &[Candidate]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, candidate)| candidate.capabilities.len())
            .map(|(index, _)| index)
    }

    fn name(&self) -> &'static str {
        "most_specialized"
    }
}

/// Routes tasks to registered agents.
pub struct Dispatcher {
    agents: RwLock<Vec<AgentRef>>,
    policy: Box<dyn SelectionPolicy>,
}

impl Dispatcher {
    /// Dispatcher with the default [`FirstCapable`] policy.
    pub fn new() -> Self {
        Self::with_policy(FirstCapable)
    }

    pub fn with_policy(policy: impl SelectionPolicy + 'static) -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            policy: Box::new(policy),
        }
    }

    /// Add an agent to the live set. No duplicate-identity check; the same
    /// agent registered twice is eligible twice.
    pub async fn register(&self, agent: AgentRef) -> AgentHandle {
        let handle = AgentHandle(agent.id());
        tracing::info!(
            agent_id = %agent.id(),
            description = agent.description(),
            "agent registered"
        );
        self.agents.write().await.push(agent);
        handle
    }

    /// Remove every registration under this handle; returns whether any
    /// was present.
    pub async fn unregister(&self, handle: &AgentHandle) -> bool {
        let mut agents = self.agents.write().await;
        let before = agents.len();
        agents.retain(|agent| agent.id() != handle.0);
        let removed = agents.len() < before;
        if removed {
            tracing::info!(agent_id = %handle.0, "agent unregistered");
        }
        removed
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Execute `task` on one capable agent.
    ///
    /// # Postconditions
    /// - `NoCapableAgent` failures happen before any agent is touched.
    /// - The chosen agent's result or error is passed through unchanged.
    ///
    /// # Errors
    /// - [`DispatchError::NoCapableAgent`] when no candidate exists or the
    ///   policy refuses
    /// - [`DispatchError::Agent`] wrapping the agent's own failure
    pub async fn execute(&self, task: &Task) -> Result<TaskResult, DispatchError> {
        let agents: Vec<AgentRef> = self.agents.read().await.clone();

        let mut candidates = Vec::new();
        let mut chosen_from = Vec::new();
        for agent in agents {
            let capabilities = agent.capabilities().await;
            if is_supported(task.required_capabilities(), &capabilities) {
                candidates.push(Candidate {
                    id: agent.id(),
                    capabilities,
                });
                chosen_from.push(agent);
            }
        }

        if candidates.is_empty() {
            tracing::warn!(
                task_id = %task.id(),
                required = %task.required_capabilities(),
                "no capable agent registered"
            );
            return Err(DispatchError::NoCapableAgent);
        }

        let index = self
            .policy
            .select(task, &candidates)
            .ok_or(DispatchError::NoCapableAgent)?;
        let agent = chosen_from.get(index).ok_or(DispatchError::NoCapableAgent)?;

        tracing::debug!(
            task_id = %task.id(),
            agent_id = %agent.id(),
            policy = self.policy.name(),
            candidates = candidates.len(),
            "task dispatched"
        );

        let result = agent.process_task(task).await?;
        Ok(result)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

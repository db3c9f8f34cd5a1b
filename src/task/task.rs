//! Core Task type - an immutable unit of work.
//!
//! # Invariants
//! - `query` is non-empty
//! - `required_capabilities` is non-empty
//! - A task is immutable after construction and consumed by exactly one
//!   dispatch/execute call; the engine never persists it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::capability::{Capability, CapabilitySet};

/// Default wall-clock budget for processing one task.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Context key carrying the target programming language for code tasks.
pub const CTX_LANGUAGE: &str = "language";
/// Context key carrying prior conversation turns (JSON array of strings,
/// alternating user/assistant starting with the user).
pub const CTX_CONVERSATION_HISTORY: &str = "conversation_history";
/// Context key requesting chunked streaming from the backend (JSON bool).
pub const CTX_STREAM: &str = "stream";
/// Context key overriding the sampling temperature for this call only
/// (JSON number).
pub const CTX_TEMPERATURE: &str = "temperature";

/// Unique identifier for a task.
///
/// # Properties
/// - Globally unique within an execution context
/// - Immutable once created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority of a task.
///
/// Ordered: `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A unit of work submitted for processing.
///
/// Built through [`Task::builder`]; all fields are read-only afterwards.
/// The `context` map carries free-form hints (see the `CTX_*` constants for
/// the keys the engine understands).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    description: String,
    query: String,
    context: HashMap<String, Value>,
    required_capabilities: CapabilitySet,
    priority: TaskPriority,
    timeout: Duration,
}

impl Task {
    /// Start building a task around its primary input.
    pub fn builder(query: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(query)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn required_capabilities(&self) -> &CapabilitySet {
        &self.required_capabilities
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn requires(&self, capability: Capability) -> bool {
        self.required_capabilities.contains(capability)
    }

    /// Target language hint for code tasks.
    pub fn language(&self) -> Option<&str> {
        self.context.get(CTX_LANGUAGE).and_then(Value::as_str)
    }

    /// Prior conversation turns, oldest first. `None` when absent or not an
    /// array; non-string entries are skipped.
    pub fn conversation_history(&self) -> Option<Vec<&str>> {
        let turns = self.context.get(CTX_CONVERSATION_HISTORY)?.as_array()?;
        Some(turns.iter().filter_map(Value::as_str).collect())
    }

    /// Whether the caller asked for a streamed backend call.
    pub fn wants_stream(&self) -> bool {
        self.context
            .get(CTX_STREAM)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Per-call sampling temperature override, if any.
    pub fn temperature_override(&self) -> Option<f32> {
        self.context
            .get(CTX_TEMPERATURE)
            .and_then(Value::as_f64)
            .map(|t| t as f32)
    }
}

/// Builder for [`Task`].
///
/// # Postconditions of `build`
/// - `task.id` is a fresh unique identifier
/// - the query and the required-capability set are non-empty
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    description: String,
    query: String,
    context: HashMap<String, Value>,
    required_capabilities: CapabilitySet,
    priority: TaskPriority,
    timeout: Duration,
}

impl TaskBuilder {
    fn new(query: impl Into<String>) -> Self {
        Self {
            description: String::new(),
            query: query.into(),
            context: HashMap::new(),
            required_capabilities: CapabilitySet::new(),
            priority: TaskPriority::default(),
            timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    /// Human-readable description; defaults to the query text.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach one context value under `key`.
    pub fn context_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Declare one required capability.
    pub fn require(mut self, capability: Capability) -> Self {
        self.required_capabilities.insert(capability);
        self
    }

    /// Declare several required capabilities at once.
    pub fn require_all(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        for capability in capabilities {
            self.required_capabilities.insert(capability);
        }
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate and construct the task.
    ///
    /// # Errors
    /// - [`TaskError::EmptyQuery`] when the query is empty or whitespace
    /// - [`TaskError::NoRequiredCapabilities`] when no capability was declared
    pub fn build(self) -> Result<Task, TaskError> {
        if self.query.trim().is_empty() {
            return Err(TaskError::EmptyQuery);
        }
        if self.required_capabilities.is_empty() {
            return Err(TaskError::NoRequiredCapabilities);
        }

        let description = if self.description.is_empty() {
            self.query.clone()
        } else {
            self.description
        };

        Ok(Task {
            id: TaskId::new(),
            description,
            query: self.query,
            context: self.context,
            required_capabilities: self.required_capabilities,
            priority: self.priority,
            timeout: self.timeout,
        })
    }
}

/// Errors that can occur while constructing a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task query cannot be empty")]
    EmptyQuery,

    #[error("task must require at least one capability")]
    NoRequiredCapabilities,
}

//! # agentmesh
//!
//! Capability-routed task execution engine for local AI model agents.
//!
//! This library provides:
//! - A task model with priorities, timeouts and free-form context hints
//! - Agents with an explicit lifecycle state machine, a bounded task-result
//!   ledger and advisory progress monitors
//! - A model adapter that derives capabilities from the model family, shapes
//!   prompts, caches responses and aggregates streamed output
//! - A dispatcher routing tasks to agents by capability containment, with
//!   injectable selection policies
//! - An Ollama HTTP binding with retry for transient failures
//!
//! ## Architecture
//!
//! ```text
//!  caller
//!    │ Dispatcher::execute(task)
//!    ▼
//!  ┌──────────────────────────────┐
//!  │ Dispatcher                   │  capability match + selection policy
//!  └───────────────┬──────────────┘
//!                  │ process_task
//!                  ▼
//!  ┌──────────────────────────────┐
//!  │ ModelAgent                   │  state machine, history, progress
//!  └───────────────┬──────────────┘
//!                  │ run
//!                  ▼
//!  ┌──────────────────────────────┐
//!  │ ModelAdapter                 │  prompt shaping, fingerprint cache
//!  └───────────────┬──────────────┘
//!                  │ complete / stream
//!                  ▼
//!  ┌──────────────────────────────┐
//!  │ OllamaClient                 │  /api/generate, /api/tags, retry
//!  └──────────────────────────────┘
//! ```
//!
//! ## Task flow
//! 1. Build a [`Task`] naming its required capabilities and context hints
//! 2. [`Dispatcher::execute`] collects capable agents and lets the selection
//!    policy pick one
//! 3. The agent goes busy and delegates to its adapter under the task's
//!    timeout
//! 4. The adapter serves from cache when it can, otherwise invokes the
//!    backend (aggregating streamed chunks in order) and caches the output
//! 5. The agent records a [`TaskResult`] in its bounded history and returns
//!    it through the dispatcher
//!
//! ## Modules
//! - `task`: task and result model
//! - `capability`: capability enum and set containment
//! - `agents`: the `Agent` trait, `ModelAgent`, history, progress
//! - `adapter`: prompt shaping, response cache, the model adapter
//! - `llm`: backend traits, model families, the Ollama client
//! - `dispatch`: agent registry and selection policies
//! - `config`: explicit engine configuration

pub mod adapter;
pub mod agents;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod task;

pub use adapter::{AdapterError, ModelAdapter};
pub use agents::{Agent, AgentError, AgentId, AgentRef, AgentState, ModelAgent};
pub use capability::{Capability, CapabilitySet};
pub use config::{ConfigError, EngineConfig};
pub use dispatch::{DispatchError, Dispatcher, FirstCapable, MostSpecialized, SelectionPolicy};
pub use llm::{BackendError, CompletionBackend, ModelCatalog, ModelFamily, OllamaClient};
pub use task::{Task, TaskBuilder, TaskError, TaskId, TaskPriority, TaskResult};

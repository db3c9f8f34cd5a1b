//! The model-backed agent.
//!
//! `ModelAgent` binds the lifecycle state machine to a [`ModelAdapter`]:
//! initialization selects the configured default model, task processing
//! delegates to the adapter under the task's timeout, and every attempt
//! leaves exactly one result in the bounded history ledger.
//!
//! All bookkeeping (state, history, progress monitors, transition log) lives
//! behind one `tokio::sync::Mutex`, held only for short synchronous
//! sections. The lock is released while the adapter call runs, which is what
//! allows busy windows of concurrent tasks to overlap. A drop guard closes
//! the busy window of a call whose future the caller drops mid-await, so an
//! abandoned call cannot leave the agent parked in `Busy`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::adapter::ModelAdapter;
use crate::capability::{first_missing, CapabilitySet};
use crate::config::EngineConfig;
use crate::llm::{CompletionBackend, ModelCatalog};
use crate::task::{Task, TaskId, TaskResult};

use super::history::TaskHistory;
use super::progress::{ProgressRegistry, TaskProgress};
use super::types::{AgentError, AgentId, AgentState, StateTransition};
use super::Agent;

/// Upper bound on retained transition-log entries.
const TRANSITION_LOG_CAPACITY: usize = 64;

/// Mutable agent bookkeeping, guarded by a single lock.
struct Bookkeeping {
    state: AgentState,
    history: TaskHistory,
    progress: ProgressRegistry,
    transitions: VecDeque<StateTransition>,
    in_flight: usize,
}

impl Bookkeeping {
    /// Record and apply a state transition. Caller holds the lock.
    fn transition(&mut self, agent_id: AgentId, to: AgentState) {
        tracing::debug!(agent_id = %agent_id, from = %self.state, to = %to, "state transition");
        self.transitions.push_back(StateTransition {
            from: self.state.clone(),
            to: to.clone(),
            at: Utc::now(),
        });
        while self.transitions.len() > TRANSITION_LOG_CAPACITY {
            self.transitions.pop_front();
        }
        self.state = to;
    }

    /// Close the busy window of a `process_task` call abandoned by its
    /// caller. The adapter future is already dropped at this point; only
    /// the accounting is outstanding.
    fn abandon_flight(&mut self, agent_id: AgentId) {
        tracing::debug!(agent_id = %agent_id, "in-flight call abandoned by caller");
        self.in_flight -= 1;
        if self.in_flight == 0 && self.state.is_busy() {
            self.transition(agent_id, AgentState::Idle);
        }
    }
}

/// Releases busy accounting when `process_task` is dropped mid-await.
///
/// The bookkeeping in `process_task` runs after the backend await. A caller
/// that drops the future there (an outer `tokio::time::timeout`, `select!`)
/// would otherwise leave `in_flight` elevated forever and the agent stuck
/// in `Busy`, refusing shutdown. The normal completion paths disarm the
/// guard once they re-acquire the lock and take over.
struct FlightGuard {
    book: Arc<Mutex<Bookkeeping>>,
    agent_id: AgentId,
    armed: bool,
}

impl FlightGuard {
    fn new(book: Arc<Mutex<Bookkeeping>>, agent_id: AgentId) -> Self {
        Self {
            book,
            agent_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let agent_id = self.agent_id;
        if let Ok(mut book) = self.book.try_lock() {
            book.abandon_flight(agent_id);
            return;
        }
        // The lock is contended; finish the accounting on the runtime.
        let book = Arc::clone(&self.book);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                book.lock().await.abandon_flight(agent_id);
            });
        }
    }
}

/// An agent that executes tasks against one locally hosted model.
pub struct ModelAgent {
    id: AgentId,
    description: String,
    default_model: String,
    adapter: Arc<ModelAdapter>,
    book: Arc<Mutex<Bookkeeping>>,
}

impl ModelAgent {
    pub fn new(adapter: Arc<ModelAdapter>, config: &EngineConfig) -> Self {
        Self {
            id: AgentId::new(),
            description: format!("model agent for {}", config.default_model),
            default_model: config.default_model.clone(),
            adapter,
            book: Arc::new(Mutex::new(Bookkeeping {
                state: AgentState::Idle,
                history: TaskHistory::new(config.max_task_history),
                progress: ProgressRegistry::new(),
                transitions: VecDeque::new(),
                in_flight: 0,
            })),
        }
    }

    /// Agent plus adapter over a client that serves both completion and
    /// catalog duty, like [`crate::llm::OllamaClient`].
    pub fn over_client<C>(client: Arc<C>, config: &EngineConfig) -> Self
    where
        C: CompletionBackend + ModelCatalog + 'static,
    {
        Self::new(Arc::new(ModelAdapter::from_client(client, config)), config)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Switch the active model; capabilities follow the new model's family.
    pub async fn select_model(&self, name: &str) -> Result<(), AgentError> {
        self.adapter.select_model(name).await.map_err(AgentError::from)
    }

    /// Pin the sampling temperature across subsequent tasks.
    pub async fn pin_temperature(&self, temperature: f32) -> Result<(), AgentError> {
        self.adapter
            .pin_temperature(temperature)
            .await
            .map_err(AgentError::from)
    }

    /// Return to the model family's recommended temperature.
    pub async fn release_temperature(&self) {
        self.adapter.release_temperature().await;
    }

    /// Snapshot of the retained task results, oldest first.
    pub async fn history(&self) -> Vec<TaskResult> {
        self.book.lock().await.history.snapshot()
    }

    /// Snapshot of the recorded state transitions, oldest first.
    pub async fn transitions(&self) -> Vec<StateTransition> {
        self.book.lock().await.transitions.iter().cloned().collect()
    }

    /// Create a progress monitor for `task_id`.
    pub async fn enable_progress_monitoring(
        &self,
        task_id: TaskId,
        expected_duration: Option<Duration>,
    ) {
        self.book.lock().await.progress.start(task_id, expected_duration);
    }

    /// Update a monitor; unknown ids are ignored and the fraction is
    /// clamped to [0.0, 1.0].
    pub async fn update_progress(&self, task_id: TaskId, status: impl Into<String>, progress: f32) {
        self.book.lock().await.progress.update(task_id, status, progress);
    }

    /// Progress snapshot for a task; `None` when it was never monitored.
    pub async fn get_progress(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.book.lock().await.progress.get(task_id)
    }
}

#[async_trait]
impl Agent for ModelAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn state(&self) -> AgentState {
        self.book.lock().await.state.clone()
    }

    async fn capabilities(&self) -> CapabilitySet {
        self.adapter.capabilities().await
    }

    /// Select the configured default model.
    ///
    /// # Postconditions
    /// - Success: state is `Idle` and the family capabilities are advertised.
    /// - Failure: state is `Error(reason)` and the error is propagated.
    ///
    /// # Errors
    /// - [`AgentError::InvalidTransition`] unless called from `Idle`
    /// - [`AgentError::Adapter`] when model selection fails
    async fn initialize(&self) -> Result<(), AgentError> {
        {
            let mut book = self.book.lock().await;
            if book.state != AgentState::Idle {
                return Err(AgentError::InvalidTransition {
                    from: book.state.clone(),
                    to: AgentState::Initializing,
                });
            }
            book.transition(self.id, AgentState::Initializing);
        }

        match self.adapter.select_model(&self.default_model).await {
            Ok(()) => {
                let mut book = self.book.lock().await;
                book.transition(self.id, AgentState::Idle);
                tracing::info!(agent_id = %self.id, model = %self.default_model, "agent initialized");
                Ok(())
            }
            Err(error) => {
                let mut book = self.book.lock().await;
                book.transition(
                    self.id,
                    AgentState::Error {
                        reason: error.to_string(),
                    },
                );
                tracing::warn!(agent_id = %self.id, error = %error, "agent initialization failed");
                Err(error.into())
            }
        }
    }

    /// Execute one task through the adapter.
    ///
    /// # Preconditions
    /// - Every required capability is advertised (checked before any state
    ///   change).
    /// - The agent is `Idle` or `Busy`.
    ///
    /// # Postconditions
    /// - Exactly one `TaskResult` is recorded in history per attempt,
    ///   before this method returns.
    /// - Success returns the agent to `Idle` once no other task is in
    ///   flight; failure or timeout leaves it in `Error`.
    async fn process_task(&self, task: &Task) -> Result<TaskResult, AgentError> {
        let started = Instant::now();

        let provided = self.capabilities().await;
        if let Some(missing) = first_missing(task.required_capabilities(), &provided) {
            tracing::warn!(
                agent_id = %self.id,
                task_id = %task.id(),
                capability = %missing,
                "task requires unsupported capability"
            );
            return Err(AgentError::CapabilityNotSupported(missing));
        }

        {
            let mut book = self.book.lock().await;
            if !book.state.accepts_tasks() {
                return Err(AgentError::InvalidTransition {
                    from: book.state.clone(),
                    to: AgentState::Busy { task_id: task.id() },
                });
            }
            book.in_flight += 1;
            book.transition(self.id, AgentState::Busy { task_id: task.id() });
        }

        tracing::info!(
            agent_id = %self.id,
            task_id = %task.id(),
            priority = ?task.priority(),
            "processing task"
        );

        // Lock released; the busy window of another task may overlap here.
        // The guard keeps the accounting balanced if the caller drops this
        // future before the bookkeeping below runs.
        let mut flight = FlightGuard::new(Arc::clone(&self.book), self.id);
        let outcome = tokio::time::timeout(task.timeout(), self.adapter.run(task)).await;

        let mut book = self.book.lock().await;
        flight.disarm();
        book.in_flight -= 1;
        match outcome {
            Ok(Ok(output)) => {
                let result =
                    TaskResult::completed(task.id(), output).with_execution_time(started.elapsed());
                book.history.record(result.clone());
                if book.in_flight == 0 && book.state.is_busy() {
                    book.transition(self.id, AgentState::Idle);
                }
                tracing::info!(
                    agent_id = %self.id,
                    task_id = %task.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task completed"
                );
                Ok(result)
            }
            Ok(Err(error)) => {
                let result = TaskResult::failed(task.id(), error.to_string())
                    .with_execution_time(started.elapsed());
                book.history.record(result);
                book.transition(
                    self.id,
                    AgentState::Error {
                        reason: error.to_string(),
                    },
                );
                tracing::warn!(
                    agent_id = %self.id,
                    task_id = %task.id(),
                    error = %error,
                    "task failed"
                );
                Err(error.into())
            }
            Err(_elapsed) => {
                // The adapter future was dropped by the timeout; the backend
                // call is canceled.
                let result = TaskResult::timed_out(task.id(), task.timeout())
                    .with_execution_time(started.elapsed());
                book.history.record(result);
                book.transition(
                    self.id,
                    AgentState::Error {
                        reason: format!("task {} timed out", task.id()),
                    },
                );
                tracing::warn!(
                    agent_id = %self.id,
                    task_id = %task.id(),
                    timeout_ms = task.timeout().as_millis() as u64,
                    "task timed out"
                );
                Err(AgentError::Timeout {
                    task_id: task.id(),
                    timeout: task.timeout(),
                })
            }
        }
    }

    /// Tear the agent down.
    ///
    /// Clears progress monitors and the response cache, then parks the agent
    /// in `Terminated`. Legal from `Idle` or `Error` only; history stays
    /// readable until the agent is dropped.
    async fn shutdown(&self) -> Result<(), AgentError> {
        {
            let mut book = self.book.lock().await;
            if !book.state.can_shut_down() {
                return Err(AgentError::InvalidTransition {
                    from: book.state.clone(),
                    to: AgentState::ShuttingDown,
                });
            }
            book.transition(self.id, AgentState::ShuttingDown);
            book.progress.clear();
        }

        self.adapter.clear_cache().await;

        let mut book = self.book.lock().await;
        book.transition(self.id, AgentState::Terminated);
        tracing::info!(agent_id = %self.id, "agent terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::capability::Capability;
    use crate::llm::testing::MockBackend;
    use crate::llm::BackendError;

    fn config() -> EngineConfig {
        EngineConfig::new("llama3:8b")
    }

    fn agent_over(mock: Arc<MockBackend>, config: &EngineConfig) -> ModelAgent {
        ModelAgent::over_client(mock, config)
    }

    fn chat_task(query: &str) -> Task {
        Task::builder(query)
            .require(Capability::BasicCompletion)
            .build()
            .unwrap()
    }

    async fn initialized_agent(mock: Arc<MockBackend>) -> ModelAgent {
        let agent = agent_over(mock, &config());
        agent.initialize().await.unwrap();
        agent
    }

    fn transition_names(transitions: &[StateTransition]) -> Vec<(String, String)> {
        transitions
            .iter()
            .map(|t| (t.from.name().to_string(), t.to.name().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_walks_through_initializing() {
        let agent = agent_over(Arc::new(MockBackend::with_output("ok")), &config());
        assert_eq!(agent.state().await, AgentState::Idle);

        agent.initialize().await.unwrap();

        assert_eq!(agent.state().await, AgentState::Idle);
        assert_eq!(
            transition_names(&agent.transitions().await),
            vec![
                ("idle".to_string(), "initializing".to_string()),
                ("initializing".to_string(), "idle".to_string()),
            ]
        );
        assert!(agent.capabilities().await.contains(Capability::Conversational));
    }

    #[tokio::test]
    async fn test_initialize_with_unknown_model_enters_error() {
        let agent = agent_over(
            Arc::new(MockBackend::with_output("ok")),
            &EngineConfig::new("missing:1b"),
        );

        let err = agent.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Adapter(AdapterError::ModelNotFound { .. })
        ));
        assert!(agent.state().await.is_error());

        // Error is only recoverable through shutdown.
        let err = agent.initialize().await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_capability_gate_leaves_state_untouched() {
        let agent = initialized_agent(Arc::new(MockBackend::with_output("ok"))).await;

        let task = Task::builder("write a parser")
            .require(Capability::CodeGeneration)
            .build()
            .unwrap();

        let err = agent.process_task(&task).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::CapabilityNotSupported(Capability::CodeGeneration)
        ));
        assert_eq!(agent.state().await, AgentState::Idle);
        assert!(agent.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_uninitialized_agent_has_no_capabilities() {
        let agent = agent_over(Arc::new(MockBackend::with_output("ok")), &config());

        let err = agent.process_task(&chat_task("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::CapabilityNotSupported(Capability::BasicCompletion)
        ));
    }

    #[tokio::test]
    async fn test_successful_task_records_history_and_returns_idle() {
        let agent = initialized_agent(Arc::new(MockBackend::with_output("the answer"))).await;

        let task = chat_task("what is the answer?");
        let result = agent.process_task(&task).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.output(), "the answer");
        assert_eq!(result.task_id(), task.id());
        assert!(result.execution_time().is_some());

        assert_eq!(agent.state().await, AgentState::Idle);
        let history = agent.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), result.id());

        assert_eq!(
            transition_names(&agent.transitions().await),
            vec![
                ("idle".to_string(), "initializing".to_string()),
                ("initializing".to_string(), "idle".to_string()),
                ("idle".to_string(), "busy".to_string()),
                ("busy".to_string(), "idle".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_task_records_result_and_enters_error() {
        let mock = MockBackend::with_output("never").fail_generation(BackendError::Api {
            status: 500,
            message: "model crashed".to_string(),
        });
        let agent = initialized_agent(Arc::new(mock)).await;

        let err = agent.process_task(&chat_task("hello")).await.unwrap_err();
        assert!(matches!(err, AgentError::Adapter(_)));

        assert!(agent.state().await.is_error());
        let history = agent.history().await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_success());
        assert!(history[0].output().contains("model crashed"));
    }

    #[tokio::test]
    async fn test_timeout_records_timed_out_result() {
        let mock = MockBackend::with_output("too slow").with_delay(Duration::from_millis(200));
        let agent = initialized_agent(Arc::new(mock)).await;

        let task = Task::builder("slow question")
            .require(Capability::BasicCompletion)
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let err = agent.process_task(&task).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Timeout { task_id, .. } if task_id == task.id()
        ));

        assert!(agent.state().await.is_error());
        let history = agent.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status(), crate::task::ResultStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_error_state_rejects_new_tasks() {
        let mock = MockBackend::with_output("too slow").with_delay(Duration::from_millis(200));
        let agent = initialized_agent(Arc::new(mock)).await;

        let slow = Task::builder("slow question")
            .require(Capability::BasicCompletion)
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        agent.process_task(&slow).await.unwrap_err();
        assert!(agent.state().await.is_error());

        let err = agent.process_task(&chat_task("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::InvalidTransition { from: AgentState::Error { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mock = Arc::new(MockBackend::with_output("ok"));
        let config = EngineConfig::new("llama3:8b").with_max_task_history(3);
        let agent = agent_over(mock, &config);
        agent.initialize().await.unwrap();

        let mut task_ids = Vec::new();
        for i in 0..5 {
            let task = chat_task(&format!("question {i}"));
            task_ids.push(task.id());
            agent.process_task(&task).await.unwrap();
        }

        let history = agent.history().await;
        assert_eq!(history.len(), 3);
        let kept: Vec<TaskId> = history.iter().map(|r| r.task_id()).collect();
        assert_eq!(kept, task_ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_concurrent_tasks_overlap_and_settle_idle() {
        let mock = Arc::new(MockBackend::with_output("ok").with_delay(Duration::from_millis(50)));
        let agent = initialized_agent(mock).await;

        let first = chat_task("first question");
        let second = chat_task("second question");
        let (a, b) = tokio::join!(agent.process_task(&first), agent.process_task(&second));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(agent.state().await, AgentState::Idle);
        assert_eq!(agent.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_call_settles_back_to_idle() {
        let mock = Arc::new(MockBackend::with_output("slow").with_delay(Duration::from_millis(200)));
        let agent = initialized_agent(mock).await;

        let task = chat_task("abandoned");
        {
            let mut call = tokio_test::task::spawn(agent.process_task(&task));
            assert!(call.poll().is_pending());
            // Dropped here, mid-backend-await; the flight guard must close
            // the busy window.
        }
        tokio::task::yield_now().await;
        assert_eq!(agent.state().await, AgentState::Idle);

        // The agent keeps accepting work and settles normally afterwards.
        let result = agent.process_task(&chat_task("follow up")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(agent.state().await, AgentState::Idle);
    }

    #[tokio::test]
    async fn test_progress_monitoring_lifecycle() {
        let agent = initialized_agent(Arc::new(MockBackend::with_output("ok"))).await;
        let id = TaskId::new();

        agent
            .enable_progress_monitoring(id, Some(Duration::from_secs(10)))
            .await;
        agent.update_progress(id, "generating", 0.5).await;

        let monitor = agent.get_progress(id).await.unwrap();
        assert_eq!(monitor.status, "generating");
        assert!((monitor.progress - 0.5).abs() < 1e-6);

        agent.update_progress(id, "overshoot", 7.0).await;
        assert_eq!(agent.get_progress(id).await.unwrap().progress, 1.0);

        // Unknown ids never fail.
        agent.update_progress(TaskId::new(), "ghost", 0.1).await;
        assert!(agent.get_progress(TaskId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_terminates_and_clears() {
        let mock = Arc::new(MockBackend::with_output("ok"));
        let engine_config = config();
        let adapter = Arc::new(ModelAdapter::from_client(mock, &engine_config));
        let agent = ModelAgent::new(adapter.clone(), &engine_config);
        agent.initialize().await.unwrap();

        let task = chat_task("hello");
        agent.process_task(&task).await.unwrap();
        agent.enable_progress_monitoring(task.id(), None).await;
        assert_eq!(adapter.cache_stats().await.entries, 1);

        agent.shutdown().await.unwrap();

        assert_eq!(agent.state().await, AgentState::Terminated);
        assert!(agent.get_progress(task.id()).await.is_none());
        assert_eq!(adapter.cache_stats().await.entries, 0);
        // History survives shutdown.
        assert_eq!(agent.history().await.len(), 1);

        let err = agent.shutdown().await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::InvalidTransition { from: AgentState::Terminated, .. }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_from_error_state() {
        let agent = agent_over(
            Arc::new(MockBackend::with_output("ok")),
            &EngineConfig::new("missing:1b"),
        );
        agent.initialize().await.unwrap_err();
        assert!(agent.state().await.is_error());

        agent.shutdown().await.unwrap();
        assert_eq!(agent.state().await, AgentState::Terminated);
    }

    #[tokio::test]
    async fn test_select_model_switches_capabilities() {
        let agent = initialized_agent(Arc::new(MockBackend::with_output("ok"))).await;
        assert!(agent.capabilities().await.contains(Capability::Conversational));

        agent.select_model("codellama:7b").await.unwrap();
        let capabilities = agent.capabilities().await;
        assert!(capabilities.contains(Capability::CodeGeneration));
        assert!(!capabilities.contains(Capability::Conversational));
    }
}

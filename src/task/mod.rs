//! Task module - defines tasks and their recorded outcomes.
//!
//! - All types are algebraic data types with exhaustive matching
//! - Invariants are documented and enforced in constructors
//! - Tasks are immutable values; results are created once and owned by the
//!   processing agent's history ledger

pub mod result;
pub mod task;

pub use result::{ResultId, ResultStatus, TaskResult};
pub use task::{
    Task, TaskBuilder, TaskError, TaskId, TaskPriority, CTX_CONVERSATION_HISTORY, CTX_LANGUAGE,
    CTX_STREAM, CTX_TEMPERATURE, DEFAULT_TASK_TIMEOUT,
};

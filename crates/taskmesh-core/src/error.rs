use crate::{AgentId, TaskId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Agent already registered: {0}")]
    DuplicateAgent(AgentId),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Invalid agent: {0}")]
    InvalidAgent(String),

    #[error("Invalid task {0}: {1}")]
    InvalidTask(TaskId, String),

    #[error("Scheduler has been shut down")]
    ShutDown,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config_manager::ConfigError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure reported by an execution delegate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("execution failed: {0}")]
    Failed(String),

    #[error("executor panicked: {0}")]
    Panicked(String),

    #[error("executor rejected task: {0}")]
    Rejected(String),
}

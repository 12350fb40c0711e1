//! Error types for work execution and run configuration.

use thiserror::Error;

use crate::types::TaskId;

/// Failure of the opaque work callable for one task.
///
/// Recovered by the worker: the task is still marked done, the failure is
/// logged, and the worker moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("task {task} failed: {reason}")]
    Failed { task: TaskId, reason: String },

    #[error("task {task} panicked: {message}")]
    Panicked { task: TaskId, message: String },
}

impl WorkError {
    pub fn failed(task: TaskId, reason: impl Into<String>) -> Self {
        Self::Failed {
            task,
            reason: reason.into(),
        }
    }
}

/// Rejected run configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be > 0")]
    ZeroWorkers,

    #[error("timeout retirement cannot be combined with a bounded queue")]
    BoundedTimeoutRetirement,

    #[error("invalid {name} value: {value}")]
    InvalidArgument { name: &'static str, value: String },
}

//! Shared identifiers and the task/result model used across the system.

use std::fmt;
use std::time::Duration;

/// Unique identifier for a task in the queue.
pub type TaskId = u64;
/// Unique identifier for a worker thread.
pub type WorkerId = u64;

/// Unit of work handed to workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Stable task identifier for logging and validation.
    pub id: TaskId,
    /// Drives the simulated work duration.
    pub magnitude: u64,
}

impl Task {
    /// Construct a new task with the provided id and magnitude.
    pub fn new(id: TaskId, magnitude: u64) -> Self {
        Self { id, magnitude }
    }
}

/// One processed task, written once by the worker that ran it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    pub worker: String,
    pub magnitude: u64,
    pub elapsed: Duration,
}

impl ResultRecord {
    pub fn new(worker: impl Into<String>, magnitude: u64, elapsed: Duration) -> Self {
        Self {
            worker: worker.into(),
            magnitude,
            elapsed,
        }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed task {} in {:.3}s",
            self.worker,
            self.magnitude,
            self.elapsed.as_secs_f64()
        )
    }
}

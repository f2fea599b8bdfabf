//! Shared identifiers and task model used across the system.

use std::time::Duration;

/// Identifier for a task as read from the task source.
pub type TaskId = u64;
/// Index of a worker thread inside the pool.
pub type WorkerId = usize;

/// Unit of simulated work fed to the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Task identifier used in log lines.
    pub id: TaskId,
    /// Milliseconds the feeder waits before submitting this task.
    pub arrival_delay_ms: u64,
    /// Milliseconds a worker spends "executing" this task.
    pub execution_ms: u64,
}

impl Task {
    /// Construct a task from its id and millisecond timings.
    pub fn new(id: TaskId, arrival_delay_ms: u64, execution_ms: u64) -> Self {
        Self {
            id,
            arrival_delay_ms,
            execution_ms,
        }
    }

    pub fn arrival_delay(&self) -> Duration {
        Duration::from_millis(self.arrival_delay_ms)
    }

    pub fn execution_duration(&self) -> Duration {
        Duration::from_millis(self.execution_ms)
    }
}

/// Opaque worker name used by sink lines and thread names.
pub fn worker_name(worker: WorkerId) -> String {
    format!("worker-{worker}")
}

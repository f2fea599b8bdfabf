//! Sequential feeder pacing task submission by arrival delay.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::FeedError;
use crate::task_queue::TaskQueue;
use crate::types::Task;

/// What a feeding pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub submitted: usize,
    /// Push attempts that found the queue full.
    pub backpressure_waits: usize,
    pub elapsed: Duration,
}

/// Pushes tasks in order, sleeping each task's arrival delay first.
pub struct Feeder {
    queue: Arc<TaskQueue>,
    push_backoff: Duration,
}

impl Feeder {
    pub fn new(queue: Arc<TaskQueue>, push_backoff: Duration) -> Self {
        Self {
            queue,
            push_backoff,
        }
    }

    /// Submit every task, blocking while the queue is full.
    ///
    /// Delays are relative: each one is slept right before its own push, so
    /// they accumulate with any time spent blocked on a full queue.
    pub fn run<I>(&self, tasks: I) -> Result<FeedStats, FeedError>
    where
        I: IntoIterator<Item = Task>,
    {
        let start = Instant::now();
        let mut stats = FeedStats::default();
        for task in tasks {
            if task.arrival_delay_ms > 0 {
                thread::sleep(task.arrival_delay());
            }
            let id = task.id;
            // push_blocking only gives up once the queue is stopped.
            let full_attempts = self
                .queue
                .push_blocking(task, self.push_backoff)
                .map_err(|err| FeedError::PoolStopped {
                    id: err.into_task().id,
                })?;
            stats.submitted += 1;
            stats.backpressure_waits += full_attempts;
            debug!(task = id, full_attempts, "task submitted");
        }
        stats.elapsed = start.elapsed();
        debug!(
            submitted = stats.submitted,
            backpressure_waits = stats.backpressure_waits,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "feeder finished"
        );
        Ok(stats)
    }
}

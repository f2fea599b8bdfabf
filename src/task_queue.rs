//! Bounded, thread-safe FIFO task queue with a stop-aware blocking hand-off.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::trace;

use crate::error::QueueError;
use crate::types::Task;

/// A capacity-limited FIFO queue shared between the feeder and the workers.
///
/// The pending tasks and the stop flag live under one mutex, so a consumer
/// sees "empty and stopped" as a single fact rather than two racy reads.
pub struct TaskQueue {
    inner: Mutex<TaskQueueState>,
    /// Signalled when a task is pushed or the queue is stopped.
    available: Condvar,
    /// Signalled when a task is popped or the queue is stopped.
    space: Condvar,
    capacity: usize,
}

struct TaskQueueState {
    queue: VecDeque<Task>,
    stopped: bool,
}

impl TaskQueue {
    /// Create an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "queue capacity must be > 0");
        Self {
            inner: Mutex::new(TaskQueueState {
                queue: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskQueueState> {
        self.inner.lock().expect("task queue mutex poisoned")
    }

    /// Enqueue without blocking; fails if the queue is full or stopped.
    pub fn try_push(&self, task: Task) -> Result<(), QueueError> {
        let mut guard = self.lock();
        self.push_locked(&mut guard, task)
    }

    fn push_locked(
        &self,
        guard: &mut MutexGuard<'_, TaskQueueState>,
        task: Task,
    ) -> Result<(), QueueError> {
        if guard.stopped {
            return Err(QueueError::Stopped { task });
        }
        if guard.queue.len() >= self.capacity {
            return Err(QueueError::Full {
                task,
                capacity: self.capacity,
            });
        }
        trace!(task = task.id, len = guard.queue.len() + 1, "enqueued");
        guard.queue.push_back(task);
        self.available.notify_one();
        Ok(())
    }

    /// Push, waiting for free space while the queue is full.
    ///
    /// Each wait is bounded by `backoff` before the push is retried. Returns
    /// how many attempts found the queue full, or the task if the queue was
    /// stopped.
    pub fn push_blocking(&self, task: Task, backoff: Duration) -> Result<usize, QueueError> {
        let mut guard = self.lock();
        let mut task = task;
        let mut full_attempts = 0usize;
        loop {
            match self.push_locked(&mut guard, task) {
                Ok(()) => return Ok(full_attempts),
                Err(QueueError::Full { task: rejected, .. }) => {
                    full_attempts += 1;
                    task = rejected;
                    // Wait releases the lock and re-acquires it before returning.
                    let (next, _) = self
                        .space
                        .wait_timeout(guard, backoff)
                        .expect("condvar wait failed");
                    guard = next;
                }
                Err(stopped) => return Err(stopped),
            }
        }
    }

    /// Try to pop the oldest task immediately without blocking.
    pub fn try_pop(&self) -> Option<Task> {
        let mut guard = self.lock();
        let task = guard.queue.pop_front();
        if task.is_some() {
            self.space.notify_one();
        }
        task
    }

    /// Block until a task is available, or return `None` once the queue is
    /// both empty and stopped.
    pub fn pop_blocking_or_stopped(&self) -> Option<Task> {
        let mut guard = self.lock();
        loop {
            if let Some(task) = guard.queue.pop_front() {
                self.space.notify_one();
                return Some(task);
            }
            if guard.stopped {
                return None;
            }
            guard = self.available.wait(guard).expect("condvar wait failed");
        }
    }

    /// Mark the queue stopped and wake every blocked producer and consumer.
    ///
    /// Tasks already queued stay poppable; new pushes are refused.
    pub fn stop(&self) {
        let mut guard = self.lock();
        guard.stopped = true;
        self.available.notify_all();
        self.space.notify_all();
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Current number of queued tasks.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::Instant;

    #[test]
    fn try_push_fails_when_full() {
        let queue = TaskQueue::new(2);
        queue.try_push(Task::new(1, 0, 0)).expect("first push");
        queue.try_push(Task::new(2, 0, 0)).expect("second push");
        let err = queue.try_push(Task::new(3, 0, 0)).unwrap_err();
        assert!(matches!(err, QueueError::Full { capacity: 2, .. }));
        // The rejected task comes back intact.
        assert_eq!(err.into_task().id, 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn try_pop_on_empty_returns_none() {
        let queue = TaskQueue::new(1);
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn resident_tasks_pop_in_push_order() {
        let queue = TaskQueue::new(8);
        for id in [40, 7, 19, 3, 88] {
            queue.try_push(Task::new(id, 0, 0)).expect("push");
        }
        let popped: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
            .map(|task| task.id)
            .collect();
        assert_eq!(popped, vec![40, 7, 19, 3, 88]);
    }

    #[test]
    fn tasks_are_consumed_once() {
        let total_tasks = 100u64;
        let queue = Arc::new(TaskQueue::new(total_tasks as usize));
        for id in 0..total_tasks {
            queue.try_push(Task::new(id, 0, 0)).expect("push");
        }

        let consumers = 4;
        let barrier = Arc::new(Barrier::new(consumers));
        let seen: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || {
                barrier.wait();
                while let Some(task) = queue.try_pop() {
                    let mut guard = seen.lock().expect("seen mutex poisoned");
                    // Each task id should be observed at most once.
                    assert!(guard.insert(task.id));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("consumer thread panicked");
        }

        let guard = seen.lock().expect("seen mutex poisoned");
        assert_eq!(guard.len(), total_tasks as usize);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn capacity_holds_under_contention() {
        let capacity = 3;
        let queue = Arc::new(TaskQueue::new(capacity));
        let producers = 4;
        let per_producer = 50u64;
        let done = Arc::new(AtomicBool::new(false));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let observer = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    max_seen.fetch_max(queue.len(), Ordering::SeqCst);
                    thread::yield_now();
                }
            })
        };

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut popped = 0u64;
                while let Some(_task) = queue.pop_blocking_or_stopped() {
                    popped += 1;
                }
                popped
            })
        };

        let mut handles = Vec::new();
        for producer in 0..producers {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for n in 0..per_producer {
                    let task = Task::new(producer * per_producer + n, 0, 0);
                    queue
                        .push_blocking(task, Duration::from_millis(1))
                        .expect("queue stopped");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("producer thread panicked");
        }
        queue.stop();
        let popped = consumer.join().expect("consumer thread panicked");
        done.store(true, Ordering::SeqCst);
        observer.join().expect("observer thread panicked");

        assert_eq!(popped, producers * per_producer);
        assert!(max_seen.load(Ordering::SeqCst) <= capacity);
    }

    #[test]
    fn pop_blocking_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new(4));
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("send ready");
            let task = queue_clone
                .pop_blocking_or_stopped()
                .expect("task queue stopped");
            tx.send(task.id).expect("send task id");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        // Pushing after the consumer blocks should wake it.
        queue.try_push(Task::new(99, 0, 0)).expect("push");

        let received = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("receive task id");
        assert_eq!(received, 99);
        handle.join().expect("blocking pop thread panicked");
    }

    #[test]
    fn pop_blocking_unblocks_on_stop() {
        let queue = Arc::new(TaskQueue::new(4));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("ready");
            let task = queue_clone.pop_blocking_or_stopped();
            done_tx.send(task.is_none()).expect("done");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        queue.stop();

        let stopped = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("done recv");
        assert!(stopped);
        handle.join().expect("consumer thread panicked");
    }

    #[test]
    fn stopped_queue_still_drains_before_reporting_empty() {
        let queue = Arc::new(TaskQueue::new(8));
        for id in 0..6 {
            queue.try_push(Task::new(id, 0, 0)).expect("push");
        }
        queue.stop();

        let consumers = 3;
        let barrier = Arc::new(Barrier::new(consumers));
        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let mut drained = 0usize;
                while queue.pop_blocking_or_stopped().is_some() {
                    drained += 1;
                }
                // A consumer may only give up once nothing is left.
                assert_eq!(queue.len(), 0);
                drained
            }));
        }

        let drained: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("consumer thread panicked"))
            .sum();
        assert_eq!(drained, 6);
    }

    #[test]
    fn push_fails_after_stop() {
        let queue = TaskQueue::new(2);
        queue.stop();
        assert!(queue.is_stopped());
        let result = queue.try_push(Task::new(1, 0, 0));
        assert!(matches!(result, Err(QueueError::Stopped { .. })));
        let result = queue.push_blocking(Task::new(2, 0, 0), Duration::from_millis(1));
        assert!(matches!(result, Err(QueueError::Stopped { .. })));
    }

    #[test]
    fn push_blocking_waits_for_space() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.try_push(Task::new(1, 0, 0)).expect("push");

        let queue_clone = Arc::clone(&queue);
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            queue_clone.try_pop().expect("task present")
        });

        let start = Instant::now();
        let full_attempts = queue
            .push_blocking(Task::new(2, 0, 0), Duration::from_millis(5))
            .expect("push");
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(full_attempts >= 1);

        assert_eq!(consumer.join().expect("consumer panicked").id, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_pop().map(|task| task.id), Some(2));
    }

    #[test]
    fn stop_releases_blocked_producer() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.try_push(Task::new(1, 0, 0)).expect("push");

        let queue_clone = Arc::clone(&queue);
        let producer = thread::spawn(move || {
            queue_clone.push_blocking(Task::new(2, 0, 0), Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(30));
        queue.stop();
        let result = producer.join().expect("producer panicked");
        assert_eq!(result.unwrap_err().into_task().id, 2);
    }
}

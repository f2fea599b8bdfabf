//! Fixed-size worker pool draining the bounded task queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::report::{ShutdownReport, cpu_delta, cpu_times_seconds};
use crate::sink::EventSink;
use crate::task_queue::TaskQueue;
use crate::types::{Task, WorkerId, worker_name};

/// Lifecycle of one worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Executing = 1,
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Executing,
            _ => WorkerState::Stopped,
        }
    }
}

/// Counters shared by every worker of one pool.
struct PoolState {
    completed: AtomicUsize,
    workers: Vec<AtomicU8>,
}

impl PoolState {
    fn new(num_workers: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            workers: (0..num_workers)
                .map(|_| AtomicU8::new(WorkerState::Idle as u8))
                .collect(),
        }
    }

    fn set(&self, worker: WorkerId, state: WorkerState) {
        self.workers[worker].store(state as u8, Ordering::SeqCst);
    }
}

/// Worker threads plus the queue they drain.
///
/// Call [`WorkerPool::shutdown`] to stop, join, and report. Dropping a pool
/// that was never shut down performs the same sequence.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    state: Arc<PoolState>,
    sink: Arc<dyn EventSink>,
    workers: Vec<thread::JoinHandle<()>>,
    started: Instant,
    cpu_start: Option<(f64, f64)>,
    report: Option<ShutdownReport>,
}

impl WorkerPool {
    /// Spawn `config.num_threads` workers over a queue of `config.queue_size`.
    pub fn new(config: &PoolConfig, sink: Arc<dyn EventSink>) -> Result<Self, PoolError> {
        if config.num_threads == 0 {
            return Err(PoolError::NoWorkers);
        }
        if config.queue_size == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let queue = Arc::new(TaskQueue::new(config.queue_size));
        let state = Arc::new(PoolState::new(config.num_threads));
        let cpu_start = cpu_times_seconds();
        let started = Instant::now();

        let mut workers = Vec::with_capacity(config.num_threads);
        for worker in 0..config.num_threads {
            let queue_ref = Arc::clone(&queue);
            let state_ref = Arc::clone(&state);
            let sink_ref = Arc::clone(&sink);
            let spawned = thread::Builder::new()
                .name(worker_name(worker))
                .spawn(move || run_worker(worker, &queue_ref, &state_ref, sink_ref.as_ref()));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // Tear down the workers that did start before bailing out.
                    queue.stop();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn { worker, source });
                }
            }
        }
        info!(
            workers = config.num_threads,
            capacity = queue.capacity(),
            "worker pool started"
        );

        Ok(Self {
            queue,
            state,
            sink,
            workers,
            started,
            cpu_start,
            report: None,
        })
    }

    /// Queue shared with the feeder.
    pub fn queue(&self) -> Arc<TaskQueue> {
        Arc::clone(&self.queue)
    }

    /// Tasks that finished executing so far.
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    pub fn num_workers(&self) -> usize {
        self.state.workers.len()
    }

    /// Snapshot of every worker's lifecycle state.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.state
            .workers
            .iter()
            .map(|state| WorkerState::from_u8(state.load(Ordering::SeqCst)))
            .collect()
    }

    /// Stop accepting work, wait for the queue to drain and every worker to
    /// exit, then emit the final report.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.finish()
    }

    fn finish(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        self.queue.stop();
        debug!(workers = self.num_workers(), "joining workers");
        for (worker, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                error!(worker = %worker_name(worker), "worker thread panicked");
            }
        }
        // A worker that panicked mid-task never reaches Stopped.
        let states = self.worker_states();
        if states.iter().any(|state| *state != WorkerState::Stopped) {
            warn!(?states, "workers exited without stopping cleanly");
        }

        // Every worker is joined, so these reads cannot race a mutation.
        let report = ShutdownReport::new(self.completed(), self.queue.len(), self.started.elapsed())
            .with_cpu_seconds(cpu_delta(self.cpu_start, cpu_times_seconds()));
        if let Err(err) = self.sink.final_report(&report) {
            warn!(error = %err, "failed to write final report");
        }
        info!(
            completed = report.completed,
            remaining = report.remaining,
            elapsed_s = report.elapsed_secs(),
            "worker pool shut down"
        );
        self.report = Some(report.clone());
        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.report.is_none() {
            self.finish();
        }
    }
}

fn run_worker(worker: WorkerId, queue: &TaskQueue, state: &PoolState, sink: &dyn EventSink) {
    let name = worker_name(worker);
    debug!(worker = %name, "worker started");
    while let Some(task) = queue.pop_blocking_or_stopped() {
        state.set(worker, WorkerState::Executing);
        execute(&name, &task, sink);
        state.completed.fetch_add(1, Ordering::SeqCst);
        state.set(worker, WorkerState::Idle);
    }
    state.set(worker, WorkerState::Stopped);
    debug!(worker = %name, "worker stopped");
}

fn execute(name: &str, task: &Task, sink: &dyn EventSink) {
    if let Err(err) = sink.task_started(name, task) {
        warn!(task = task.id, error = %err, "failed to log task start");
    }
    thread::sleep(task.execution_duration());
    if let Err(err) = sink.task_completed(task) {
        warn!(task = task.id, error = %err, "failed to log task completion");
    }
}

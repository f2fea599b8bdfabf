//! Simulation and benchmark runners wiring config, tasks, pool, and feeder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{info, warn};

use crate::config::{DEFAULT_PUSH_BACKOFF, PoolConfig};
use crate::feeder::{FeedStats, Feeder};
use crate::pool::WorkerPool;
use crate::report::ShutdownReport;
use crate::sink::{EventSink, FileSink, MemorySink};
use crate::task_source;
use crate::types::Task;

const CSV_HEADER: &str = "threads,queue_size,tasks,elapsed_ms,throughput_tasks_per_s,backpressure_waits,cpu_user_s,cpu_sys_s,completed,remaining";

/// Inputs for simulating one task file.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub task_file: PathBuf,
    pub config_path: PathBuf,
    /// Defaults to `log_<task file name>` beside the task file.
    pub log_file: Option<PathBuf>,
    /// Mirror sink lines to stdout.
    pub mirror_console: bool,
}

/// Outcome of a simulated run.
#[derive(Debug)]
pub struct RunSummary {
    pub report: ShutdownReport,
    pub feed: FeedStats,
    pub rejected_records: usize,
    pub log_file: PathBuf,
}

/// Log file used when none is given: `log_<name>` next to the task file.
pub fn default_log_path(task_file: &Path) -> PathBuf {
    let name = task_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tasks".to_string());
    task_file.with_file_name(format!("log_{name}"))
}

/// Load every resource, feed the task file through a pool, and shut it down.
///
/// Any startup failure returns before a worker is spawned.
pub fn run_file(opts: &RunOptions) -> anyhow::Result<RunSummary> {
    let config = PoolConfig::load(&opts.config_path).context("invalid pool configuration")?;
    let loaded = task_source::load(&opts.task_file).context("invalid task source")?;
    if !loaded.rejected.is_empty() {
        warn!(
            rejected = loaded.rejected.len(),
            accepted = loaded.tasks.len(),
            "some task records were skipped"
        );
    }

    let log_file = opts
        .log_file
        .clone()
        .unwrap_or_else(|| default_log_path(&opts.task_file));
    let sink = Arc::new(FileSink::create(&log_file, opts.mirror_console)?);
    info!(
        tasks = loaded.tasks.len(),
        log = %sink.path().display(),
        "starting simulation"
    );

    // The pool reports on drop, so an early return below still emits it.
    let pool = WorkerPool::new(&config, sink)?;
    let feed = Feeder::new(pool.queue(), config.push_backoff).run(loaded.tasks)?;
    let report = pool.shutdown();

    Ok(RunSummary {
        report,
        feed,
        rejected_records: loaded.rejected.len(),
        log_file,
    })
}

/// Parameters for a synthetic benchmark sweep.
#[derive(Clone, Debug)]
pub struct BenchOptions {
    pub thread_sets: Vec<usize>,
    pub queue_size: usize,
    pub tasks: usize,
    pub exec_ms: u64,
    pub arrival_ms: u64,
}

/// Aggregated metrics from a single benchmark run.
#[derive(Debug)]
pub struct BenchResult {
    pub threads: usize,
    pub queue_size: usize,
    pub tasks: usize,
    pub elapsed_ms: f64,
    pub throughput: f64,
    pub backpressure_waits: usize,
    pub report: ShutdownReport,
}

impl BenchResult {
    fn csv_row(&self) -> String {
        let (cpu_user, cpu_sys) = match self.report.cpu_seconds {
            Some((user, sys)) => (format!("{user:.4}"), format!("{sys:.4}")),
            None => ("NA".to_string(), "NA".to_string()),
        };
        format!(
            "{},{},{},{:.2},{:.2},{},{},{},{},{}",
            self.threads,
            self.queue_size,
            self.tasks,
            self.elapsed_ms,
            self.throughput,
            self.backpressure_waits,
            cpu_user,
            cpu_sys,
            self.report.completed,
            self.report.remaining
        )
    }
}

/// Run `tasks` synthetic tasks through a pool of `threads` workers.
pub fn benchmark_once(
    threads: usize,
    queue_size: usize,
    tasks: usize,
    exec_ms: u64,
    arrival_ms: u64,
) -> anyhow::Result<BenchResult> {
    let sink: Arc<dyn EventSink> = Arc::new(MemorySink::new());
    let pool = WorkerPool::new(&PoolConfig::new(threads, queue_size), sink)?;
    let workload = (0..tasks as u64).map(|id| Task::new(id, arrival_ms, exec_ms));
    let feed = Feeder::new(pool.queue(), DEFAULT_PUSH_BACKOFF).run(workload)?;
    let queue = pool.queue();
    let report = pool.shutdown();
    // Shutdown drains the queue; anything still here was never executed.
    let mut leftover = 0;
    while queue.try_pop().is_some() {
        leftover += 1;
    }
    if leftover > 0 {
        warn!(leftover, "tasks left in queue after shutdown");
    }

    let elapsed_ms = report.elapsed.as_secs_f64() * 1000.0;
    let throughput = if elapsed_ms > 0.0 {
        report.completed as f64 / (elapsed_ms / 1000.0)
    } else {
        0.0
    };
    if report.completed + report.remaining != tasks {
        warn!(
            expected = tasks,
            completed = report.completed,
            remaining = report.remaining,
            "benchmark lost tasks"
        );
    }
    Ok(BenchResult {
        threads,
        queue_size,
        tasks,
        elapsed_ms,
        throughput,
        backpressure_waits: feed.backpressure_waits,
        report,
    })
}

/// Sweep the configured thread counts and print one CSV row per run.
pub fn run_benchmark(opts: &BenchOptions) -> anyhow::Result<Vec<BenchResult>> {
    if opts.thread_sets.is_empty() || opts.thread_sets.contains(&0) {
        bail!("benchmark thread counts must be > 0");
    }
    if opts.queue_size == 0 {
        bail!("benchmark queue size must be > 0");
    }
    if opts.tasks == 0 {
        bail!("benchmark task count must be > 0");
    }

    println!("{CSV_HEADER}");
    let mut results = Vec::with_capacity(opts.thread_sets.len());
    for threads in opts.thread_sets.iter().copied() {
        let result = benchmark_once(
            threads,
            opts.queue_size,
            opts.tasks,
            opts.exec_ms,
            opts.arrival_ms,
        )?;
        println!("{}", result.csv_row());
        results.push(result);
    }
    Ok(results)
}

/// Parse a comma-separated list of positive counts (e.g. `1,2,4`).
pub fn parse_count_list(arg: &str) -> Result<Vec<usize>, String> {
    arg.split(',')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(format!("invalid count {:?} in list {arg:?}", part.trim())),
        })
        .collect()
}

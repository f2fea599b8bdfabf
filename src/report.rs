//! Final summary produced once every worker has been joined.

use std::fmt;
use std::time::Duration;

/// Counters read after shutdown plus the run's elapsed time.
#[derive(Clone, Debug, PartialEq)]
pub struct ShutdownReport {
    pub completed: usize,
    pub remaining: usize,
    pub elapsed: Duration,
    /// Process CPU (user, system) seconds spent during the pool's lifetime.
    pub cpu_seconds: Option<(f64, f64)>,
}

impl ShutdownReport {
    pub fn new(completed: usize, remaining: usize, elapsed: Duration) -> Self {
        Self {
            completed,
            remaining,
            elapsed,
            cpu_seconds: None,
        }
    }

    pub fn with_cpu_seconds(mut self, cpu_seconds: Option<(f64, f64)>) -> Self {
        self.cpu_seconds = cpu_seconds;
        self
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Final Report ---")?;
        writeln!(f, "Total tasks processed: {}", self.completed)?;
        writeln!(f, "Remaining tasks in queue: {}", self.remaining)?;
        writeln!(f, "Total execution time: {:.3} seconds", self.elapsed_secs())?;
        if let Some((user, sys)) = self.cpu_seconds {
            writeln!(f, "CPU time: user={user:.4}s sys={sys:.4}s")?;
        }
        write!(f, "Pool shutdown completed successfully.")
    }
}

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
pub fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    let mut usage: rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
pub fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// CPU seconds spent between two snapshots, if both were available.
pub fn cpu_delta(start: Option<(f64, f64)>, end: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (start, end) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            Some((user_end - user_start, sys_end - sys_start))
        }
        _ => None,
    }
}

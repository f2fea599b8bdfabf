//! Append-only text sinks for per-task lines and the final report.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::error::SinkError;
use crate::report::ShutdownReport;
use crate::types::Task;

/// Destination of the run's textual output.
///
/// Implementations only need `write_line`; the per-event formatting is shared.
pub trait EventSink: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn task_started(&self, worker: &str, task: &Task) -> Result<(), SinkError> {
        self.write_line(&format!("Thread {worker} executing Task {}", task.id))
    }

    fn task_completed(&self, task: &Task) -> Result<(), SinkError> {
        self.write_line(&format!("Task {} completed.", task.id))
    }

    /// Write the blank separator and every report line, then flush.
    ///
    /// A failed line does not cut the report short; the first error is
    /// returned once everything has been attempted.
    fn final_report(&self, report: &ShutdownReport) -> Result<(), SinkError> {
        let text = report.to_string();
        let mut first_err = None;
        for line in std::iter::once("").chain(text.lines()) {
            if let Err(err) = self.write_line(line) {
                first_err.get_or_insert(err);
            }
        }
        if let Err(err) = self.flush() {
            first_err.get_or_insert(err);
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Log file sink that optionally mirrors every line to the console.
///
/// The log file is authoritative: a failing mirror (closed stdout, broken
/// pipe) is warned about once and then switched off.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    mirror: Option<Mutex<Box<dyn Write + Send>>>,
    mirror_failed: AtomicBool,
}

impl FileSink {
    /// Create (truncate) the log file at `path`, mirroring to stdout if asked.
    pub fn create(path: &Path, mirror_console: bool) -> Result<Self, SinkError> {
        let mirror = mirror_console.then(|| Box::new(io::stdout()) as Box<dyn Write + Send>);
        Self::with_mirror(path, mirror)
    }

    /// Create (truncate) the log file at `path` with an arbitrary mirror.
    pub fn with_mirror(
        path: &Path,
        mirror: Option<Box<dyn Write + Send>>,
    ) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
            mirror: mirror.map(Mutex::new),
            mirror_failed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mirror_line(&self, line: &str) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        if self.mirror_failed.load(Ordering::Relaxed) {
            return;
        }
        let mut out = mirror.lock().expect("console mirror mutex poisoned");
        if let Err(err) = writeln!(out, "{line}") {
            if !self.mirror_failed.swap(true, Ordering::Relaxed) {
                warn!(error = %err, "console mirror failed; logging to file only");
            }
        }
    }
}

impl EventSink for FileSink {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        // Hold the file lock while mirroring so both outputs keep one order.
        let mut writer = self.writer.lock().expect("log writer mutex poisoned");
        writeln!(writer, "{line}")?;
        self.mirror_line(line);
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().expect("log writer mutex poisoned");
        writer.flush()?;
        Ok(())
    }
}

/// In-memory sink used by benchmarks and tests.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line written so far.
    #[cfg(test)]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("memory sink mutex poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        self.lines
            .lock()
            .expect("memory sink mutex poisoned")
            .push(line.to_string());
        Ok(())
    }
}

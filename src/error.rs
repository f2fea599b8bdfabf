//! Error types for the queue, pool, and the resources loaded at startup.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Task, TaskId};

/// Why a non-blocking push was refused. The task is handed back either way.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full (capacity: {capacity})")]
    Full { task: Task, capacity: usize },
    #[error("queue is stopped")]
    Stopped { task: Task },
}

impl QueueError {
    /// Recover the task that could not be enqueued.
    pub fn into_task(self) -> Task {
        match self {
            QueueError::Full { task, .. } | QueueError::Stopped { task } => task,
        }
    }
}

/// Errors raised while reading the key=value pool configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("line {line}: invalid value for `{key}`: {value:?} (expected a positive integer)")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
    #[error("line {line}: expected key=value, got {content:?}")]
    Syntax { line: usize, content: String },
}

/// A task record that could not be turned into a [`Task`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct MalformedRecord {
    pub line: usize,
    pub reason: String,
}

/// Errors raised while reading the task source.
#[derive(Error, Debug)]
pub enum TaskSourceError {
    #[error("failed to read task file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("task source contains no valid records ({rejected} rejected)")]
    Empty { rejected: usize },
}

/// Errors raised by the event sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write log: {0}")]
    Write(#[from] io::Error),
}

/// Errors raised while building the worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("pool needs at least one worker")]
    NoWorkers,
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by the feeder.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeedError {
    #[error("pool stopped before task {id} could be submitted")]
    PoolStopped { id: TaskId },
}

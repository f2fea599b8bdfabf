//! Pool configuration loaded from a `key=value` file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.txt";

const KEY_NUM_THREADS: &str = "num_threads";
const KEY_QUEUE_SIZE: &str = "queue_size";

/// Upper bound on a single feeder wait while the queue is full.
pub const DEFAULT_PUSH_BACKOFF: Duration = Duration::from_millis(1);

/// Worker count and queue capacity for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub num_threads: usize,
    pub queue_size: usize,
    /// Bounded wait between feeder push attempts on a full queue.
    pub push_backoff: Duration,
}

impl PoolConfig {
    pub fn new(num_threads: usize, queue_size: usize) -> Self {
        Self {
            num_threads,
            queue_size,
            push_backoff: DEFAULT_PUSH_BACKOFF,
        }
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse `key=value` lines. Blank lines and `#` comments are skipped,
    /// unknown keys are ignored, and the last occurrence of a key wins.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut num_threads = None;
        let mut queue_size = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    content: line.to_string(),
                });
            };
            let (key, value) = (key.trim(), value.trim());
            let slot = match key {
                KEY_NUM_THREADS => &mut num_threads,
                KEY_QUEUE_SIZE => &mut queue_size,
                other => {
                    warn!(line = line_no, key = other, "ignoring unknown config key");
                    continue;
                }
            };
            *slot = Some(parse_positive(line_no, key, value)?);
        }

        Ok(Self::new(
            num_threads.ok_or(ConfigError::MissingKey(KEY_NUM_THREADS))?,
            queue_size.ok_or(ConfigError::MissingKey(KEY_QUEUE_SIZE))?,
        ))
    }
}

fn parse_positive(line: usize, key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

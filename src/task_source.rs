//! Line-oriented task source: `id arrival_delay execution_duration` per line.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{MalformedRecord, TaskSourceError};
use crate::types::Task;

/// Tasks accepted from a source plus the records that were skipped.
#[derive(Debug, Default)]
pub struct TaskLoad {
    pub tasks: Vec<Task>,
    pub rejected: Vec<MalformedRecord>,
}

/// Read a task file, refusing to continue if no record is usable.
pub fn load(path: &Path) -> Result<TaskLoad, TaskSourceError> {
    let bytes = fs::read(path).map_err(|source| TaskSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = parse_bytes(&bytes);
    if loaded.tasks.is_empty() {
        return Err(TaskSourceError::Empty {
            rejected: loaded.rejected.len(),
        });
    }
    Ok(loaded)
}

/// Parse every record in order. Malformed lines are reported and skipped.
///
/// Encoding is checked per line, so a stray non-UTF-8 byte only costs the
/// record it appears in.
pub fn parse_bytes(bytes: &[u8]) -> TaskLoad {
    let mut loaded = TaskLoad::default();
    for (index, raw) in bytes.split(|byte| *byte == b'\n').enumerate() {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let result = match std::str::from_utf8(raw) {
            Ok(text) => {
                let line = text.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                parse_record(index + 1, line)
            }
            Err(_) => Err(MalformedRecord {
                line: index + 1,
                reason: "record is not valid UTF-8".to_string(),
            }),
        };
        match result {
            Ok(task) => loaded.tasks.push(task),
            Err(record) => {
                warn!(line = record.line, reason = %record.reason, "skipping malformed task record");
                loaded.rejected.push(record);
            }
        }
    }
    loaded
}

/// Parse a single non-empty record.
pub fn parse_record(line: usize, record: &str) -> Result<Task, MalformedRecord> {
    let fields: Vec<&str> = record.split_whitespace().collect();
    if fields.len() != 3 {
        return Err(MalformedRecord {
            line,
            reason: format!("expected 3 fields, found {}", fields.len()),
        });
    }
    let field = |position: usize, name: &str| {
        fields[position]
            .parse::<u64>()
            .map_err(|_| MalformedRecord {
                line,
                reason: format!(
                    "{name} must be a non-negative integer, got {:?}",
                    fields[position]
                ),
            })
    };
    Ok(Task::new(
        field(0, "id")?,
        field(1, "arrival_delay")?,
        field(2, "execution_duration")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_in_order() {
        let loaded = parse_bytes(b"1 0 100\n2 0 50\n3   5\t10\n");
        assert!(loaded.rejected.is_empty());
        assert_eq!(
            loaded.tasks,
            vec![
                Task::new(1, 0, 100),
                Task::new(2, 0, 50),
                Task::new(3, 5, 10)
            ]
        );
    }

    #[test]
    fn malformed_records_are_skipped_not_zero_filled() {
        let loaded = parse_bytes(b"1 0 100\n2 abc 50\n3 0\n\n# note\n4 -1 5\n5 0 10 extra\n6 1 1\n");
        let ids: Vec<u64> = loaded.tasks.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![1, 6]);
        let lines: Vec<usize> = loaded.rejected.iter().map(|record| record.line).collect();
        assert_eq!(lines, vec![2, 3, 6, 7]);
        assert!(loaded.rejected[0].reason.contains("arrival_delay"));
    }

    #[test]
    fn parse_record_reports_field_count() {
        let err = parse_record(9, "1 2").unwrap_err();
        assert_eq!(err.line, 9);
        assert_eq!(err.reason, "expected 3 fields, found 2");
    }

    #[test]
    fn invalid_utf8_only_rejects_its_own_line() {
        let loaded = parse_bytes(b"1 0 1\n\xff 0 1\n3 0 1\n");
        let ids: Vec<u64> = loaded.tasks.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(loaded.rejected.len(), 1);
        assert_eq!(loaded.rejected[0].line, 2);
        assert_eq!(loaded.rejected[0].reason, "record is not valid UTF-8");
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let loaded = parse_bytes(b"1 0 1\r\n2 0 2\r\n");
        assert!(loaded.rejected.is_empty());
        assert_eq!(loaded.tasks, vec![Task::new(1, 0, 1), Task::new(2, 0, 2)]);
    }

    #[test]
    fn load_keeps_valid_records_around_a_bad_byte() {
        let path = std::env::temp_dir().join(format!(
            "taskpool-tasks-latin1-{}.txt",
            std::process::id()
        ));
        fs::write(&path, b"1 0 1\n\xe9t\xe9 0 1\n3 0 1\n").expect("write tasks");
        let loaded = load(&path).expect("file with one bad line still loads");
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.tasks.len(), 2);
        assert_eq!(loaded.rejected.len(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load(Path::new("/nonexistent/taskpool/tasks.txt")).unwrap_err();
        assert!(matches!(err, TaskSourceError::Io { .. }));
    }
}

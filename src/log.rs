//! Per-account offline message log.
//!
//! While no client is attached, private messages and disconnect notices
//! are appended here and played back verbatim on the next attach. Plain
//! text, one timestamped line per entry, truncated once read.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::StoreError;

/// Append-only log file played back on attach.
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>) -> MessageLog {
        MessageLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line, prefixed with a local timestamp.
    pub fn write_line(&self, line: &str) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        let stamp = Local::now().format("%a %b %e %H:%M:%S %Y");
        writeln!(file, "[{stamp}] {line}").map_err(write_err)
    }

    /// Whether there is anything to play back. A missing file is empty.
    pub fn is_empty(&self) -> bool {
        match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        }
    }

    /// Read all buffered lines, oldest first.
    pub fn lines(&self) -> Result<Vec<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Drop the buffered backlog.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("alice.log"));
        assert!(log.is_empty());
        assert!(log.lines().unwrap().is_empty());
    }

    #[test]
    fn lines_are_appended_in_order_and_timestamped() {
        let dir = tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("alice.log"));

        log.write_line("first").unwrap();
        log.write_line("second").unwrap();

        let lines = log.lines().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].ends_with("second"));
        assert!(!log.is_empty());
    }

    #[test]
    fn clear_discards_the_backlog() {
        let dir = tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("alice.log"));

        log.write_line("pending").unwrap();
        log.clear().unwrap();
        assert!(log.is_empty());

        // Clearing an already-empty log is fine.
        log.clear().unwrap();
    }
}

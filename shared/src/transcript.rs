//! Append-only conversation transcript and its persistence
//!
//! Both the server and the terminal client keep every line they see in a
//! `TranscriptStore` for the lifetime of the process. At shutdown the
//! transcript is written once to `<dir>/<prefix>_<yyyyMMdd_HHmmss>.txt`,
//! one entry per line. Nothing is written when no line was ever recorded.

use chrono::{DateTime, Local};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write transcript {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, append-only log of transcript lines
///
/// Safe to share between tasks; appends from concurrent callers are
/// serialized, and entries are never modified once recorded.
#[derive(Debug)]
pub struct TranscriptStore {
    prefix: String,
    entries: Mutex<Vec<String>>,
}

impl TranscriptStore {
    /// Creates an empty transcript whose files will be named `<prefix>_<timestamp>.txt`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Records one line at the end of the transcript
    pub fn append(&self, line: impl Into<String>) {
        self.lock().push(line.into());
    }

    /// Point-in-time copy of every entry in append order
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes the transcript into `dir`, creating the directory if needed
    ///
    /// Returns `Ok(None)` without touching the filesystem when nothing has
    /// been recorded, otherwise the absolute path of the written file.
    pub fn flush(&self, dir: &Path) -> Result<Option<PathBuf>, TranscriptError> {
        let contents = {
            let entries = self.lock();
            if entries.is_empty() {
                return Ok(None);
            }
            entries.iter().fold(String::new(), |mut acc, line| {
                acc.push_str(line);
                acc.push('\n');
                acc
            })
        };

        fs::create_dir_all(dir).map_err(|source| TranscriptError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(transcript_file_name(&self.prefix, Local::now()));
        fs::write(&path, contents).map_err(|source| TranscriptError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(Some(fs::canonicalize(&path).unwrap_or(path)))
    }

    // Poisoning is ignored: entries are only ever pushed whole
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// File name used for a transcript flushed at `at`
pub fn transcript_file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}_{}.txt", prefix, at.format(FILE_TIMESTAMP_FORMAT))
}

/// Flushes a transcript exactly once, on `finish` or when dropped
///
/// Holding one of these for the lifetime of a run loop guarantees the
/// transcript is persisted on every exit path: normal return, early `?`
/// return and panic unwinding alike.
#[derive(Debug)]
pub struct FlushGuard {
    transcript: Arc<TranscriptStore>,
    dir: PathBuf,
    flushed: bool,
}

impl FlushGuard {
    pub fn new(transcript: Arc<TranscriptStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            transcript,
            dir: dir.into(),
            flushed: false,
        }
    }

    /// Flushes now and disarms the guard
    pub fn finish(mut self) -> Result<Option<PathBuf>, TranscriptError> {
        self.flushed = true;
        self.transcript.flush(&self.dir)
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        match self.transcript.flush(&self.dir) {
            Ok(Some(path)) => info!("Conversation saved to: {}", path.display()),
            Ok(None) => {}
            Err(e) => error!("Failed to save conversation: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;

    fn read_transcript(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_append_keeps_order() {
        let store = TranscriptStore::new("server_chat");
        store.append("User 1 joined the chat.");
        store.append("User 1: hi");
        store.append("User 1 left the chat.");

        assert_eq!(store.len(), 3);
        assert_eq!(
            store.entries(),
            vec!["User 1 joined the chat.", "User 1: hi", "User 1 left the chat."]
        );
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(TranscriptStore::new("server_chat"));

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for n in 0..100 {
                        store.append(format!("{}-{}", writer, n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = store.entries();
        assert_eq!(entries.len(), 800);

        // Each writer's own lines stay in the order it appended them
        for writer in 0..8 {
            let own: Vec<_> = entries
                .iter()
                .filter(|e| e.starts_with(&format!("{}-", writer)))
                .cloned()
                .collect();
            let expected: Vec<_> = (0..100).map(|n| format!("{}-{}", writer, n)).collect();
            assert_eq!(own, expected);
        }
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("logs");

        let store = TranscriptStore::new("server_chat");
        let written = store.flush(&dir).unwrap();

        assert!(written.is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn test_flush_creates_directory_and_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("logs");

        let store = TranscriptStore::new("server_chat");
        store.append("User 1 joined the chat.");
        store.append("User 1: héllo ✓");

        let path = store.flush(&dir).unwrap().unwrap();

        assert!(path.is_absolute());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("server_chat_"));
        assert!(name.ends_with(".txt"));
        assert_eq!(
            read_transcript(&path),
            vec!["User 1 joined the chat.", "User 1: héllo ✓"]
        );
        assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn test_flush_into_unwritable_location_reports_error() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("not_a_dir");
        fs::write(&blocker, "occupied").unwrap();

        let store = TranscriptStore::new("server_chat");
        store.append("line");

        let result = store.flush(&blocker.join("logs"));
        assert!(matches!(result, Err(TranscriptError::CreateDir { .. })));
    }

    #[test]
    fn test_transcript_file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            transcript_file_name("client_chat", at),
            "client_chat_20240307_090502.txt"
        );
    }

    #[test]
    fn test_guard_flushes_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(TranscriptStore::new("server_chat"));
        store.append("User 1 joined the chat.");

        {
            let _guard = FlushGuard::new(Arc::clone(&store), temp.path());
        }

        let files = files_in(temp.path());
        assert_eq!(files.len(), 1);
        assert_eq!(read_transcript(&files[0]), vec!["User 1 joined the chat."]);
    }

    #[test]
    fn test_guard_finish_flushes_once() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(TranscriptStore::new("server_chat"));
        store.append("only line");

        let guard = FlushGuard::new(Arc::clone(&store), temp.path());
        let path = guard.finish().unwrap().unwrap();

        // Dropping a finished guard must not write a second file
        let files = files_in(temp.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name(), path.file_name());
    }

    #[test]
    fn test_guard_flushes_during_unwind() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(TranscriptStore::new("server_chat"));
        store.append("before the crash");

        let dir = temp.path().to_path_buf();
        let guarded = Arc::clone(&store);
        let result = thread::spawn(move || {
            let _guard = FlushGuard::new(guarded, dir);
            panic!("accept loop blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(files_in(temp.path()).len(), 1);
    }
}

//! On-disk history store: one JSON file per issue number.
//!
//! The only process-wide mutable state in the engine. Access is sequential
//! within one bot instance; writes go through a temp file and rename so a
//! crash mid-write never corrupts the previous snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::History;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("history store io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("history store decode at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, issue_number: u64) -> PathBuf {
        self.dir.join(format!("issue-{issue_number}.json"))
    }

    pub fn load(&self, issue_number: u64) -> Result<Option<History>, StoreError> {
        let path = self.path(issue_number);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io { path, source: e }),
        };
        let history = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Decode { path, source: e })?;
        Ok(Some(history))
    }

    pub fn save(&self, issue_number: u64, history: &History) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path(issue_number);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_string(history).map_err(|e| StoreError::Decode {
            path: path.clone(),
            source: e,
        })?;
        write_and_rename(&tmp, &path, &raw).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!(issue = issue_number, ?path, "history persisted");
        Ok(())
    }

    /// Deleting a never-persisted conversation is not an error.
    pub fn delete(&self, issue_number: u64) -> Result<(), StoreError> {
        let path = self.path(issue_number);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }
}

fn write_and_rename(tmp: &Path, path: &Path, raw: &str) -> io::Result<()> {
    fs::write(tmp, raw)?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;
    use crate::llm::ContentBlock;

    fn sample_history() -> History {
        History {
            system_prompt: "sys".to_string(),
            turns: vec![Turn {
                user: vec![ContentBlock::text("hello")],
                assistant: None,
            }],
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let history = sample_history();
        store.save(42, &history).unwrap();
        assert_eq!(store.load(42).unwrap(), Some(history));
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        assert_eq!(store.load(7).unwrap(), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        store.save(42, &sample_history()).unwrap();
        store.delete(42).unwrap();
        store.delete(42).unwrap();
        assert_eq!(store.load(42).unwrap(), None);
    }

    #[test]
    fn files_are_keyed_by_issue_number() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        store.save(1, &sample_history()).unwrap();
        store.save(2, &sample_history()).unwrap();
        assert!(dir.path().join("issue-1.json").exists());
        assert!(dir.path().join("issue-2.json").exists());
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("issue-9.json"), "{ not json").unwrap();
        let store = HistoryStore::new(dir.path());
        assert!(matches!(store.load(9), Err(StoreError::Decode { .. })));
    }
}

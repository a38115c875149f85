//! Virtual file system: an in-memory overlay with tombstones on top of a
//! read-only base snapshot.
//!
//! The base is anything implementing [`FileSource`]: in production a pinned
//! remote commit ([`remote::RemoteTree`]), in tests an in-memory map. Staged
//! changes never touch the base; they leave the overlay only through the
//! [`Changelist`] export consumed by the git porcelain.

pub mod remote;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

/// Error from the read-only base.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SourceError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("source: {0}")]
    Source(#[from] SourceError),
}

/// A read-only snapshot of files keyed by slash-separated paths.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Content of the file at `path`, or `None` when absent.
    async fn read(&self, path: &str) -> Result<Option<String>, SourceError>;

    async fn is_dir(&self, path: &str) -> Result<bool, SourceError>;

    /// Names of the immediate children of `dir` (`""` is the root).
    async fn list_dir(&self, dir: &str) -> Result<Vec<String>, SourceError>;
}

/// Strips a single leading `/`; all VFS paths are relative to the repo root.
pub fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Parent directory of a normalized path (`""` for top-level entries).
fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final component of a normalized path.
fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Snapshot of staged modifications and deletions, exported for committing.
#[derive(Clone, Debug, Default)]
pub struct Changelist {
    modified: BTreeMap<String, String>,
    deleted: BTreeSet<String>,
}

impl Changelist {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn is_modified(&self, path: &str) -> bool {
        self.modified.contains_key(normalize(path))
    }

    pub fn is_deleted(&self, path: &str) -> bool {
        self.deleted.contains(normalize(path))
    }

    /// Modified paths with their staged content, in path order.
    pub fn modified(&self) -> impl Iterator<Item = (&str, &str)> {
        self.modified.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Deleted paths, in path order.
    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(|p| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.deleted.len()
    }
}

/// The writable view: overlay writes and tombstoned deletes over a base.
pub struct Vfs {
    base: Box<dyn FileSource>,
    overlay: BTreeMap<String, String>,
    tombstones: BTreeSet<String>,
}

impl Vfs {
    pub fn new(base: Box<dyn FileSource>) -> Self {
        Self {
            base,
            overlay: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// Swaps the base snapshot, keeping the overlay. Used after a commit
    /// re-pins the workspace to the new branch tip.
    pub fn set_base(&mut self, base: Box<dyn FileSource>) {
        self.base = base;
    }

    pub async fn read(&self, path: &str) -> Result<String, VfsError> {
        let path = normalize(path);
        if self.tombstones.contains(path) {
            return Err(VfsError::FileNotFound(path.to_string()));
        }
        if let Some(content) = self.overlay.get(path) {
            return Ok(content.clone());
        }
        match self.base.read(path).await? {
            Some(content) => Ok(content),
            None => Err(VfsError::FileNotFound(path.to_string())),
        }
    }

    pub fn write(&mut self, path: &str, content: impl Into<String>) {
        let path = normalize(path).to_string();
        self.tombstones.remove(&path);
        self.overlay.insert(path, content.into());
    }

    pub fn delete(&mut self, path: &str) {
        let path = normalize(path).to_string();
        self.overlay.remove(&path);
        self.tombstones.insert(path);
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, VfsError> {
        let path = normalize(path);
        if self.tombstones.contains(path) {
            return Ok(false);
        }
        if self.overlay.contains_key(path) {
            return Ok(true);
        }
        Ok(self.base.read(path).await?.is_some())
    }

    /// Directories exist only in the base; the overlay never creates them.
    pub async fn is_dir(&self, path: &str) -> Result<bool, VfsError> {
        Ok(self.base.is_dir(normalize(path)).await?)
    }

    /// Base entries (minus tombstones) unioned with overlay entries whose
    /// immediate parent is `dir`. Sorted, no duplicates.
    pub async fn list_dir(&self, dir: &str) -> Result<Vec<String>, VfsError> {
        let dir = normalize(dir).trim_end_matches('/');
        let mut names: BTreeSet<String> = BTreeSet::new();
        for name in self.base.list_dir(dir).await? {
            let full = join(dir, &name);
            if !self.tombstones.contains(&full) {
                names.insert(name);
            }
        }
        for path in self.overlay.keys() {
            if parent(path) == dir {
                names.insert(basename(path).to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    pub fn has_local_changes(&self) -> bool {
        !self.overlay.is_empty() || !self.tombstones.is_empty()
    }

    pub fn clear_local_changes(&mut self) {
        self.overlay.clear();
        self.tombstones.clear();
    }

    pub fn changelist(&self) -> Changelist {
        Changelist {
            modified: self.overlay.clone(),
            deleted: self.tombstones.clone(),
        }
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// In-memory [`FileSource`] used in tests and for empty bases.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files
            .insert(normalize(path).to_string(), content.to_string());
        self
    }
}

#[async_trait]
impl FileSource for MemorySource {
    async fn read(&self, path: &str) -> Result<Option<String>, SourceError> {
        Ok(self.files.get(path).cloned())
    }

    async fn is_dir(&self, path: &str) -> Result<bool, SourceError> {
        if path.is_empty() {
            return Ok(true);
        }
        let prefix = format!("{path}/");
        Ok(self.files.keys().any(|p| p.starts_with(&prefix)))
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<String>, SourceError> {
        let mut names = BTreeSet::new();
        for path in self.files.keys() {
            let rest = if dir.is_empty() {
                path.as_str()
            } else if let Some(rest) = path.strip_prefix(&format!("{dir}/")) {
                rest
            } else {
                continue;
            };
            match rest.split_once('/') {
                Some((head, _)) => names.insert(head.to_string()),
                None => names.insert(rest.to_string()),
            };
        }
        Ok(names.into_iter().collect())
    }
}

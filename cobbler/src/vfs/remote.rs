//! [`FileSource`] over a pinned remote commit.
//!
//! Loads the recursive tree listing once at construction; blob content is
//! fetched lazily by SHA and memoized, since the model tends to view a file
//! several times while editing it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use super::{FileSource, SourceError};
use crate::github::{GithubApi, GithubError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryKind {
    Blob,
    Tree,
}

pub struct RemoteTree {
    api: Arc<dyn GithubApi>,
    owner: String,
    repo: String,
    entries: BTreeMap<String, (EntryKind, String)>,
    blob_cache: Mutex<HashMap<String, String>>,
}

impl RemoteTree {
    /// Loads the tree of `commit` in one recursive listing.
    pub async fn load(
        api: Arc<dyn GithubApi>,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<Self, GithubError> {
        let (listing, truncated) = api.get_tree(owner, repo, commit).await?;
        if truncated {
            warn!(owner, repo, commit, "tree listing truncated by the platform");
        }
        let mut entries = BTreeMap::new();
        for entry in listing {
            let kind = match entry.kind.as_str() {
                "blob" => EntryKind::Blob,
                "tree" => EntryKind::Tree,
                _ => continue,
            };
            entries.insert(entry.path, (kind, entry.sha));
        }
        Ok(Self {
            api,
            owner: owner.to_string(),
            repo: repo.to_string(),
            entries,
            blob_cache: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl FileSource for RemoteTree {
    async fn read(&self, path: &str) -> Result<Option<String>, SourceError> {
        let sha = match self.entries.get(path) {
            Some((EntryKind::Blob, sha)) => sha.clone(),
            _ => return Ok(None),
        };
        if let Some(content) = self
            .blob_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&sha)
        {
            return Ok(Some(content.clone()));
        }
        let content = self
            .api
            .get_blob(&self.owner, &self.repo, &sha)
            .await
            .map_err(|e| SourceError(e.to_string()))?;
        self.blob_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sha, content.clone());
        Ok(Some(content))
    }

    async fn is_dir(&self, path: &str) -> Result<bool, SourceError> {
        if path.is_empty() {
            return Ok(true);
        }
        Ok(matches!(self.entries.get(path), Some((EntryKind::Tree, _))))
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<String>, SourceError> {
        let mut names = BTreeSet::new();
        for path in self.entries.keys() {
            let rest = if dir.is_empty() {
                path.as_str()
            } else if let Some(rest) = path.strip_prefix(&format!("{dir}/")) {
                rest
            } else {
                continue;
            };
            if !rest.contains('/') {
                names.insert(rest.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}

//! Remote git porcelain: branch, commit, and merge over the hosting API.
//!
//! There is no local clone anywhere in this engine. Commits are built from
//! the staged changelist as a tree *delta* on top of the branch tip's tree,
//! with deletes signaled by a null blob SHA.

use std::sync::Arc;

use tracing::debug;

use super::{CommitInfo, GithubApi, GithubError, TreeWriteEntry};
use crate::vfs::Changelist;

/// Git operations scoped to one repository.
pub struct GitPorcelain {
    api: Arc<dyn GithubApi>,
    owner: String,
    repo: String,
}

impl GitPorcelain {
    pub fn new(api: Arc<dyn GithubApi>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    async fn tip(&self, branch: &str) -> Result<CommitInfo, GithubError> {
        self.api
            .get_branch_tip(&self.owner, &self.repo, branch)
            .await?
            .ok_or_else(|| GithubError::NotFound(format!("branch {branch}")))
    }

    /// Creates `new` at the tip of `base`. Idempotent: succeeds if `new`
    /// already exists, at whatever commit it points to.
    pub async fn create_branch(&self, base: &str, new: &str) -> Result<(), GithubError> {
        if self
            .api
            .get_branch_tip(&self.owner, &self.repo, new)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let base_tip = self.tip(base).await?;
        debug!(branch = new, base, sha = %base_tip.sha, "creating branch");
        self.api
            .create_ref(&self.owner, &self.repo, new, &base_tip.sha)
            .await
    }

    /// Commits the changelist onto `branch` and fast-forwards its ref.
    /// Returns the new tip. Refuses an empty changelist.
    pub async fn commit(
        &self,
        branch: &str,
        changes: &Changelist,
        message: &str,
    ) -> Result<CommitInfo, GithubError> {
        if changes.is_empty() {
            return Err(GithubError::Protocol(
                "refusing to commit an empty changelist".to_string(),
            ));
        }
        let tip = self.tip(branch).await?;

        let mut entries = Vec::new();
        for (path, content) in changes.modified() {
            let sha = self
                .api
                .create_blob(&self.owner, &self.repo, content)
                .await?;
            entries.push(TreeWriteEntry::blob(path, sha));
        }
        for path in changes.deleted() {
            entries.push(TreeWriteEntry::delete(path));
        }

        let tree = self
            .api
            .create_tree(&self.owner, &self.repo, &tip.tree_sha, &entries)
            .await?;
        let commit = self
            .api
            .create_commit(&self.owner, &self.repo, message, &tree, &[tip.sha.clone()])
            .await?;
        self.api
            .update_ref(&self.owner, &self.repo, branch, &commit.sha)
            .await?;
        debug!(branch, sha = %commit.sha, entries = entries.len(), "committed changelist");
        Ok(commit)
    }

    /// Merges `source` into `target` and returns the resulting target tip.
    ///
    /// - `source` not ahead of `target`: no-op, target tip returned.
    /// - `target` not behind `source`'s history: fast-forward.
    /// - Otherwise a two-parent merge commit `(target, source)` whose tree is
    ///   source's tree, so the merged content is exactly the source side.
    pub async fn merge(
        &self,
        source: &str,
        target: &str,
        message: &str,
    ) -> Result<CommitInfo, GithubError> {
        let cmp = self
            .api
            .compare(&self.owner, &self.repo, target, source)
            .await?;
        let target_tip = self.tip(target).await?;
        if cmp.ahead_by == 0 {
            return Ok(target_tip);
        }
        let source_tip = self.tip(source).await?;
        if cmp.behind_by == 0 {
            debug!(source, target, sha = %source_tip.sha, "fast-forward merge");
            self.api
                .update_ref(&self.owner, &self.repo, target, &source_tip.sha)
                .await?;
            return Ok(source_tip);
        }
        let merge = self
            .api
            .create_commit(
                &self.owner,
                &self.repo,
                message,
                &source_tip.tree_sha,
                &[target_tip.sha.clone(), source_tip.sha.clone()],
            )
            .await?;
        self.api
            .update_ref(&self.owner, &self.repo, target, &merge.sha)
            .await?;
        debug!(source, target, sha = %merge.sha, "merge commit created");
        Ok(merge)
    }
}

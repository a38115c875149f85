//! Workspace: the three-stage discipline *local → validated → published*.
//!
//! Local changes live in the VFS overlay over the work-branch tip. Validation
//! commits them to the work branch and runs the external validator on the new
//! tip. Publishing merges the work branch into the review branch, which is
//! the branch the pull request tracks; reviewers see merges of presumably
//! complete changes, not every validation commit.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::github::{CommitInfo, GitPorcelain, GithubApi, GithubError, PullRequestRef};
use crate::validate::{CommitValidator, ValidationError, ValidationOutcome};
use crate::vfs::remote::RemoteTree;
use crate::vfs::{Vfs, VfsError};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Recoverable by the model: it must supply a commit message.
    #[error("a commit message is required when local changes exist")]
    CommitMessageRequired,
    /// Recoverable by the model: there is nothing to commit.
    #[error("no local changes to commit; omit the commit message")]
    NothingToCommit,
    /// Recoverable by the model: validate before publishing.
    #[error("unvalidated local changes exist; run validation before publishing")]
    UnvalidatedChanges,
    #[error("{0} open pull requests from {1}; expected at most one")]
    DuplicatePulls(usize, String),
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error(transparent)]
    Github(#[from] GithubError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl WorkspaceError {
    /// True for the variants the model can fix by adjusting its arguments.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            WorkspaceError::CommitMessageRequired
                | WorkspaceError::NothingToCommit
                | WorkspaceError::UnvalidatedChanges
                | WorkspaceError::Vfs(VfsError::FileNotFound(_))
        )
    }
}

/// Everything needed to open a workspace for one task.
#[derive(Clone, Debug)]
pub struct WorkspaceConfig {
    pub owner: String,
    pub repo: String,
    /// Branch a completed change merges into (normally the default branch).
    pub target_branch: String,
    /// Private per-issue branch accumulating validated commits.
    pub work_branch: String,
    /// Per-issue branch the pull request tracks.
    pub review_branch: String,
    pub bot_login: String,
    /// Requested as reviewer when the pull request is first created.
    pub reviewer: Option<String>,
}

pub struct Workspace {
    api: Arc<dyn GithubApi>,
    git: GitPorcelain,
    validator: Arc<dyn CommitValidator>,
    config: WorkspaceConfig,
    base_commit: CommitInfo,
    vfs: Vfs,
}

impl Workspace {
    /// Opens the workspace: ensures both branches exist (created at the
    /// target tip when missing) and pins the VFS base to the work-branch tip.
    pub async fn open(
        api: Arc<dyn GithubApi>,
        validator: Arc<dyn CommitValidator>,
        config: WorkspaceConfig,
    ) -> Result<Self, WorkspaceError> {
        let git = GitPorcelain::new(Arc::clone(&api), &config.owner, &config.repo);
        git.create_branch(&config.target_branch, &config.work_branch)
            .await?;
        git.create_branch(&config.target_branch, &config.review_branch)
            .await?;

        let base_commit = api
            .get_branch_tip(&config.owner, &config.repo, &config.work_branch)
            .await?
            .ok_or_else(|| {
                GithubError::Protocol(format!(
                    "work branch {} vanished after creation",
                    config.work_branch
                ))
            })?;
        let base =
            RemoteTree::load(Arc::clone(&api), &config.owner, &config.repo, &base_commit.sha)
                .await?;
        debug!(
            work = %config.work_branch,
            review = %config.review_branch,
            base = %base_commit.sha,
            "workspace opened"
        );
        Ok(Self {
            api,
            git,
            validator,
            config,
            base_commit,
            vfs: Vfs::new(Box::new(base)),
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Tip of the work branch the overlay is layered on.
    pub fn base_commit(&self) -> &CommitInfo {
        &self.base_commit
    }

    // -- VFS pass-through --

    pub async fn read(&self, path: &str) -> Result<String, WorkspaceError> {
        Ok(self.vfs.read(path).await?)
    }

    pub fn write(&mut self, path: &str, content: impl Into<String>) {
        self.vfs.write(path, content);
    }

    pub fn delete(&mut self, path: &str) {
        self.vfs.delete(path);
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, WorkspaceError> {
        Ok(self.vfs.file_exists(path).await?)
    }

    pub async fn is_dir(&self, path: &str) -> Result<bool, WorkspaceError> {
        Ok(self.vfs.is_dir(path).await?)
    }

    pub async fn list_dir(&self, dir: &str) -> Result<Vec<String>, WorkspaceError> {
        Ok(self.vfs.list_dir(dir).await?)
    }

    pub fn has_local_changes(&self) -> bool {
        self.vfs.has_local_changes()
    }

    pub fn clear_local_changes(&mut self) {
        self.vfs.clear_local_changes();
    }

    /// True iff the work branch carries validated commits the review branch
    /// has not received yet.
    pub async fn has_unpublished_changes(&self) -> Result<bool, WorkspaceError> {
        let cmp = self
            .api
            .compare(
                &self.config.owner,
                &self.config.repo,
                &self.config.review_branch,
                &self.config.work_branch,
            )
            .await?;
        Ok(cmp.ahead_by > 0)
    }

    /// Commits the overlay (when present) to the work branch and runs the
    /// validator on the resulting tip.
    ///
    /// A commit message is required exactly when local changes exist; the
    /// mismatched cases are input errors for the model. Afterwards there are
    /// no local changes and the outcome pertains to the current tip.
    pub async fn validate_changes(
        &mut self,
        message: Option<&str>,
    ) -> Result<ValidationOutcome, WorkspaceError> {
        let changes = self.vfs.changelist();
        if changes.is_empty() {
            if message.is_some() {
                return Err(WorkspaceError::NothingToCommit);
            }
        } else {
            let message = message.ok_or(WorkspaceError::CommitMessageRequired)?;
            let commit = self
                .git
                .commit(&self.config.work_branch, &changes, message)
                .await?;
            self.vfs.clear_local_changes();
            self.repin(commit).await?;
            info!(sha = %self.base_commit.sha, "local changes committed to work branch");
        }
        let outcome = self
            .validator
            .validate(&self.config.owner, &self.config.repo, &self.base_commit.sha)
            .await?;
        Ok(outcome)
    }

    /// Merges the work branch into the review branch and ensures the pull
    /// request exists. With an existing PR the title and body are ignored;
    /// publishing only updates content.
    pub async fn publish_changes_for_review(
        &mut self,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef, WorkspaceError> {
        if self.vfs.has_local_changes() {
            return Err(WorkspaceError::UnvalidatedChanges);
        }
        let message = format!(
            "Merge {} into {}",
            self.config.work_branch, self.config.review_branch
        );
        self.git
            .merge(&self.config.work_branch, &self.config.review_branch, &message)
            .await?;

        let mut pulls = self
            .api
            .list_open_pulls(
                &self.config.owner,
                &self.config.repo,
                &self.config.review_branch,
                &self.config.target_branch,
            )
            .await?;
        pulls.retain(|p| p.author == self.config.bot_login);
        match pulls.len() {
            0 => {
                let pull = self
                    .api
                    .create_pull(
                        &self.config.owner,
                        &self.config.repo,
                        title,
                        body,
                        &self.config.review_branch,
                        &self.config.target_branch,
                    )
                    .await?;
                info!(number = pull.number, "pull request created");
                if let Some(reviewer) = &self.config.reviewer {
                    if reviewer != &self.config.bot_login {
                        if let Err(e) = self
                            .api
                            .request_reviewers(
                                &self.config.owner,
                                &self.config.repo,
                                pull.number,
                                std::slice::from_ref(reviewer),
                            )
                            .await
                        {
                            warn!(error = %e, "reviewer request failed");
                        }
                    }
                }
                Ok(pull)
            }
            1 => Ok(pulls.remove(0)),
            n => Err(WorkspaceError::DuplicatePulls(
                n,
                self.config.review_branch.clone(),
            )),
        }
    }

    async fn repin(&mut self, commit: CommitInfo) -> Result<(), WorkspaceError> {
        let base = RemoteTree::load(
            Arc::clone(&self.api),
            &self.config.owner,
            &self.config.repo,
            &commit.sha,
        )
        .await?;
        self.vfs.set_base(Box::new(base));
        self.base_commit = commit;
        Ok(())
    }
}

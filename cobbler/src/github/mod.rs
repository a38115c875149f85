//! GitHub data model and API surface.
//!
//! [`GithubApi`] is the seam between the engine and the hosting platform:
//! everything the bot consumes (search, refs, git data, comments, reactions,
//! labels, checks) is one trait method, so tests can substitute an in-memory
//! host. [`rest::RestClient`] is the octocrab-backed implementation.

mod porcelain;
pub mod rest;

pub use porcelain::GitPorcelain;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies an issue the bot has been assigned. Unique per repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
    /// Login of the user who opened the issue. Used to request a reviewer
    /// on the pull request the bot opens.
    pub author: String,
}

/// An open pull request, as returned by the list/create endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub base_branch: String,
    pub author: String,
}

/// An issue comment or a pull-request review comment.
///
/// Review-comment replies carry `in_reply_to` pointing at the *root* of their
/// thread; the platform flattens chains, so the reply graph is a forest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub in_reply_to: Option<u64>,
}

/// A pull-request review summary (approve / request-changes / comment).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A reaction on a comment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub author: String,
    pub content: String,
}

/// Whether a comment id refers to an issue comment or a PR review comment.
/// The two live in different reaction namespaces on the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentScope {
    Issue,
    Review,
}

/// Repository metadata the task builder needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub default_branch: Option<String>,
    pub language: Option<String>,
}

/// A commit together with the tree it points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub tree_sha: String,
}

/// Result of comparing `base...head`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Comparison {
    pub ahead_by: u64,
    pub behind_by: u64,
}

/// One entry of a (possibly recursive) tree listing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

/// One entry of a tree *delta* to write. `sha: None` is the platform's
/// delete marker (null blob SHA).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeWriteEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: Option<String>,
}

impl TreeWriteEntry {
    /// A regular-file blob entry (mode `100644`).
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            kind: "blob".to_string(),
            sha: Some(sha.into()),
        }
    }

    /// A delete marker for a regular file.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            kind: "blob".to_string(),
            sha: None,
        }
    }
}

/// A label the bot manages, with fixed color and description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LabelSpec {
    pub name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

/// Status snapshot of the checks attached to one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckRun {
    pub name: String,
    /// `queued`, `in_progress`, or `completed`.
    pub status: String,
    /// Present once completed: `success`, `failure`, `neutral`, `skipped`, …
    pub conclusion: Option<String>,
}

/// Combined commit status (the legacy status API).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CombinedStatus {
    /// `success`, `pending`, or `failure`.
    pub state: String,
    pub total_count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    /// A referenced object does not exist (mapped from 404 where the route
    /// can legitimately miss).
    #[error("not found: {0}")]
    NotFound(String),
    #[error("github api: {0}")]
    Api(#[from] octocrab::Error),
    /// The platform answered with something the engine cannot use
    /// (e.g. a repository without a default branch).
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl GithubError {
    pub fn is_not_found(&self) -> bool {
        match self {
            GithubError::NotFound(_) => true,
            GithubError::Api(e) => api_status(e) == Some(404),
            GithubError::Protocol(_) => false,
        }
    }
}

/// Extracts the HTTP status of an API-level octocrab error, if any.
pub(crate) fn api_status(err: &octocrab::Error) -> Option<u16> {
    match err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

/// Everything the engine asks of the hosting platform.
///
/// Implemented by [`rest::RestClient`] for real use and by in-memory fakes in
/// tests. All methods are sequential-safe; the engine never issues two calls
/// concurrently for one task.
#[async_trait]
pub trait GithubApi: Send + Sync {
    // -- search & repository metadata --

    /// Issue search with the platform query syntax. Returns matching issues.
    async fn search_issues(&self, query: &str) -> Result<Vec<IssueRef>, GithubError>;

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<RepoInfo, GithubError>;

    /// Decoded README content, or `None` when the repository has none.
    async fn get_readme(&self, owner: &str, repo: &str) -> Result<Option<String>, GithubError>;

    /// Decoded content of one file at a ref, or `None` when absent.
    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Option<String>, GithubError>;

    // -- refs and git data --

    /// Tip commit of a branch, or `None` when the branch does not exist.
    async fn get_branch_tip(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<CommitInfo>, GithubError>;

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError>;

    /// Moves `refs/heads/<branch>` to `sha` (no force).
    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError>;

    async fn compare(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, GithubError>;

    /// Uploads one UTF-8 blob, returning its SHA.
    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &str,
    ) -> Result<String, GithubError>;

    /// Creates a tree delta on top of `base_tree`, returning the new tree SHA.
    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeWriteEntry],
    ) -> Result<String, GithubError>;

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<CommitInfo, GithubError>;

    /// Recursive tree listing at a commit-ish. The bool is the platform's
    /// truncation flag for very large trees.
    async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<(Vec<TreeEntry>, bool), GithubError>;

    /// Decoded blob content by SHA.
    async fn get_blob(&self, owner: &str, repo: &str, sha: &str) -> Result<String, GithubError>;

    // -- issues, pull requests, comments --

    async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, GithubError>;

    async fn list_pull_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, GithubError>;

    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, GithubError>;

    /// Open pull requests from `head_branch` into `base` in this repository.
    async fn list_open_pulls(
        &self,
        owner: &str,
        repo: &str,
        head_branch: &str,
        base: &str,
    ) -> Result<Vec<PullRequestRef>, GithubError>;

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestRef, GithubError>;

    /// Best-effort reviewer request on a pull request.
    async fn request_reviewers(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<(), GithubError>;

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), GithubError>;

    /// Replies to a review comment in a pull request.
    async fn create_review_reply(
        &self,
        owner: &str,
        repo: &str,
        pull_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<(), GithubError>;

    async fn list_comment_reactions(
        &self,
        owner: &str,
        repo: &str,
        scope: CommentScope,
        comment_id: u64,
    ) -> Result<Vec<Reaction>, GithubError>;

    async fn create_comment_reaction(
        &self,
        owner: &str,
        repo: &str,
        scope: CommentScope,
        comment_id: u64,
        content: &str,
    ) -> Result<(), GithubError>;

    // -- labels --

    /// Creates the label if the repository does not have it yet.
    async fn ensure_label(
        &self,
        owner: &str,
        repo: &str,
        label: &LabelSpec,
    ) -> Result<(), GithubError>;

    async fn add_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        names: &[&str],
    ) -> Result<(), GithubError>;

    /// Removing a label that is not present is not an error.
    async fn remove_label(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        name: &str,
    ) -> Result<(), GithubError>;

    // -- checks --

    async fn list_check_runs(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CheckRun>, GithubError>;

    async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, GithubError>;
}

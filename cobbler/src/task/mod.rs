//! Task generation: the polling pipeline from issue search to the bot's
//! channel.
//!
//! Each cycle searches for open issues assigned to the bot that are neither
//! being worked on nor blocked, synthesizes a [`Task`] per candidate, and
//! yields it only when [`Task::needs_attention`] holds: a brand-new issue,
//! or at least one comment the bot has not yet acknowledged with a reaction.

pub mod branch;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bot::labels;
use crate::github::{Comment, CommentScope, GithubApi, GithubError, IssueRef, PullRequestRef, RepoInfo, Review};
use crate::validate::ValidationOutcome;

/// Paths probed (at the target branch) for style-guide material.
const STYLE_GUIDE_PATHS: &[&str] = &[
    "CONTRIBUTING.md",
    "STYLEGUIDE.md",
    "STYLE_GUIDE.md",
    "docs/STYLE_GUIDE.md",
    ".github/CONTRIBUTING.md",
];

const README_EXCERPT_CHARS: usize = 2000;
const FILE_TREE_CAP: usize = 200;

/// A bounded sketch of the codebase for the model's first look.
#[derive(Clone, Debug, Default)]
pub struct CodebaseSummary {
    pub language: Option<String>,
    pub readme_excerpt: Option<String>,
    pub file_tree: Vec<String>,
    pub tree_truncated: bool,
}

/// Everything fetched about the conversation around the issue.
#[derive(Clone, Debug, Default)]
pub struct TaskComments {
    pub issue: Vec<Comment>,
    pub reviews: Vec<Review>,
    pub review_comments: Vec<Comment>,
    /// Review comments organized into threads: root id → comments sorted by
    /// creation time (the root itself first).
    pub review_threads: BTreeMap<u64, Vec<Comment>>,
    /// Issue comment ids the bot has not acknowledged yet.
    pub issue_requiring_response: Vec<u64>,
    /// Review comment ids the bot has not acknowledged yet.
    pub review_requiring_response: Vec<u64>,
}

/// One unit of work, rebuilt fresh every generator cycle.
#[derive(Clone, Debug)]
pub struct Task {
    pub issue: IssueRef,
    pub repo: RepoInfo,
    pub pull: Option<PullRequestRef>,
    pub target_branch: String,
    pub source_branch: String,
    pub work_branch: String,
    pub style_guides: Vec<(String, String)>,
    pub summary: CodebaseSummary,
    pub comments: TaskComments,
    /// Populated by the agent once the workspace is open.
    pub has_unpublished_changes: bool,
    /// Populated by the agent's opening no-commit validation.
    pub validation: Option<ValidationOutcome>,
}

impl Task {
    /// A brand-new issue (no comments, no PR), or anything awaiting a reply.
    pub fn needs_attention(&self) -> bool {
        let brand_new = self.comments.issue.is_empty() && self.pull.is_none();
        brand_new
            || !self.comments.issue_requiring_response.is_empty()
            || !self.comments.review_requiring_response.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskBuildError {
    /// The repository has no default branch to target. Task-fatal.
    #[error("repository has no default branch")]
    MissingDefaultBranch,
    /// More than one open bot-authored PR for the issue branch. Task-fatal.
    #[error("{0} open pull requests from {1}; expected at most one")]
    DuplicatePulls(usize, String),
    #[error(transparent)]
    Github(#[from] GithubError),
}

/// What the generator hands the bot: a ready task, or a synthesis failure
/// the bot must mark blocked.
pub enum GeneratedTask {
    Ready(Box<Task>),
    Failed { issue: IssueRef, reason: String },
}

/// Groups review comments into threads keyed by root id. Every reply points
/// at the root (the platform flattens chains), so this is a plain partition;
/// each thread is sorted by creation time, ties broken by id.
pub fn organize_threads(comments: &[Comment]) -> BTreeMap<u64, Vec<Comment>> {
    let mut threads: BTreeMap<u64, Vec<Comment>> = BTreeMap::new();
    for comment in comments {
        let root = comment.in_reply_to.unwrap_or(comment.id);
        threads.entry(root).or_default().push(comment.clone());
    }
    for thread in threads.values_mut() {
        thread.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }
    threads
}

/// Ids of the comments requiring a response: not authored by the bot and
/// carrying no reaction from the bot.
async fn requires_response(
    api: &dyn GithubApi,
    bot_login: &str,
    owner: &str,
    repo: &str,
    scope: CommentScope,
    comments: &[Comment],
) -> Result<Vec<u64>, GithubError> {
    let mut out = Vec::new();
    for comment in comments {
        if comment.author == bot_login {
            continue;
        }
        let reactions = api
            .list_comment_reactions(owner, repo, scope, comment.id)
            .await?;
        if !reactions.iter().any(|r| r.author == bot_login) {
            out.push(comment.id);
        }
    }
    Ok(out)
}

/// Synthesizes the full task for one issue.
pub async fn build_task(
    api: &dyn GithubApi,
    bot_login: &str,
    issue: IssueRef,
) -> Result<Task, TaskBuildError> {
    let repo = api.get_repo(&issue.owner, &issue.repo).await?;
    let target_branch = repo
        .default_branch
        .clone()
        .ok_or(TaskBuildError::MissingDefaultBranch)?;
    let source_branch = branch::source_branch(issue.number, &issue.title);
    let work_branch = branch::work_branch(&source_branch);

    let mut pulls = api
        .list_open_pulls(&issue.owner, &issue.repo, &source_branch, &target_branch)
        .await?;
    pulls.retain(|p| p.author == bot_login);
    let pull = match pulls.len() {
        0 => None,
        1 => Some(pulls.remove(0)),
        n => return Err(TaskBuildError::DuplicatePulls(n, source_branch)),
    };

    let readme_excerpt = api
        .get_readme(&issue.owner, &issue.repo)
        .await?
        .map(|readme| readme.chars().take(README_EXCERPT_CHARS).collect());
    let (tree, api_truncated) = api
        .get_tree(&issue.owner, &issue.repo, &target_branch)
        .await?;
    let mut file_tree: Vec<String> = tree
        .into_iter()
        .filter(|e| e.kind == "blob")
        .map(|e| e.path)
        .collect();
    let tree_truncated = api_truncated || file_tree.len() > FILE_TREE_CAP;
    file_tree.truncate(FILE_TREE_CAP);

    let mut style_guides = Vec::new();
    for path in STYLE_GUIDE_PATHS {
        if let Some(text) = api
            .get_file(&issue.owner, &issue.repo, path, &target_branch)
            .await?
        {
            style_guides.push((path.to_string(), text));
        }
    }

    let mut issue_comments = api
        .list_issue_comments(&issue.owner, &issue.repo, issue.number)
        .await?;
    issue_comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let (reviews, review_comments) = match &pull {
        Some(p) => (
            api.list_pull_reviews(&issue.owner, &issue.repo, p.number)
                .await?,
            api.list_review_comments(&issue.owner, &issue.repo, p.number)
                .await?,
        ),
        None => (Vec::new(), Vec::new()),
    };
    let review_threads = organize_threads(&review_comments);

    let issue_requiring_response = requires_response(
        api,
        bot_login,
        &issue.owner,
        &issue.repo,
        CommentScope::Issue,
        &issue_comments,
    )
    .await?;
    let review_requiring_response = requires_response(
        api,
        bot_login,
        &issue.owner,
        &issue.repo,
        CommentScope::Review,
        &review_comments,
    )
    .await?;

    let language = repo.language.clone();
    Ok(Task {
        issue,
        repo,
        pull,
        target_branch,
        source_branch,
        work_branch,
        style_guides,
        summary: CodebaseSummary {
            language,
            readme_excerpt,
            file_tree,
            tree_truncated,
        },
        comments: TaskComments {
            issue: issue_comments,
            reviews,
            review_comments,
            review_threads,
            issue_requiring_response,
            review_requiring_response,
        },
        has_unpublished_changes: false,
        validation: None,
    })
}

/// Producer side of the pipeline: search, synthesize, gate, yield, sleep.
pub struct TaskGenerator {
    api: Arc<dyn GithubApi>,
    bot_login: String,
    interval: Duration,
    once: bool,
}

impl TaskGenerator {
    pub fn new(api: Arc<dyn GithubApi>, bot_login: impl Into<String>, interval: Duration) -> Self {
        Self {
            api,
            bot_login: bot_login.into(),
            interval,
            once: false,
        }
    }

    /// Stop after a single cycle (operational convenience for cron-style runs).
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    fn query(&self) -> String {
        format!(
            "assignee:{} is:issue is:open -label:{} -label:{}",
            self.bot_login,
            labels::WORKING.name,
            labels::BLOCKED.name
        )
    }

    /// Runs cycles until cancellation. A search failure is program-fatal and
    /// propagates; per-issue synthesis failures either skip the issue (API
    /// hiccups) or are yielded as [`GeneratedTask::Failed`] so the bot can
    /// block the issue.
    pub async fn run(
        self,
        tx: mpsc::Sender<GeneratedTask>,
        cancel: CancellationToken,
    ) -> Result<(), GithubError> {
        loop {
            let issues = self.api.search_issues(&self.query()).await?;
            debug!(candidates = issues.len(), "search cycle complete");
            for issue in issues {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let number = issue.number;
                match build_task(self.api.as_ref(), &self.bot_login, issue.clone()).await {
                    Ok(task) => {
                        if task.needs_attention() {
                            info!(issue = number, "task needs attention, yielding");
                            if tx.send(GeneratedTask::Ready(Box::new(task))).await.is_err() {
                                return Ok(());
                            }
                        } else {
                            debug!(issue = number, "task does not need attention");
                        }
                    }
                    Err(TaskBuildError::Github(e)) => {
                        warn!(issue = number, error = %e, "task synthesis failed, skipping cycle");
                    }
                    Err(e) => {
                        if tx
                            .send(GeneratedTask::Failed {
                                issue,
                                reason: e.to_string(),
                            })
                            .await
                            .is_err()
                        {
                            return Ok(());
                        }
                    }
                }
            }
            if self.once {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

//! Shared test support: an in-memory GitHub host implementing [`GithubApi`]
//! as a tiny git server (refs, commits, flat trees, blobs) plus the issue,
//! comment, reaction, label, and check surfaces the engine touches.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use ctor::ctor;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Installs a `RUST_LOG`-driven subscriber once per test binary so library
/// tracing shows up under `--nocapture`.
#[ctor]
fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_filter(filter),
        )
        .try_init();
}

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use cobbler::github::{
    CheckRun, CombinedStatus, Comment, CommentScope, CommitInfo, Comparison, GithubApi,
    GithubError, IssueRef, LabelSpec, PullRequestRef, Reaction, RepoInfo, Review, TreeEntry,
    TreeWriteEntry,
};
use cobbler::validate::{CommitValidator, ValidationError, ValidationOutcome};

#[derive(Clone, Debug)]
pub struct FakeCommit {
    pub tree: String,
    pub parents: Vec<String>,
    pub message: String,
}

#[derive(Default)]
pub struct FakeState {
    pub repo: RepoInfo,
    pub readme: Option<String>,
    pub refs: BTreeMap<String, String>,
    pub commits: HashMap<String, FakeCommit>,
    /// tree sha → path → blob sha (flat, blobs only)
    pub trees: HashMap<String, BTreeMap<String, String>>,
    pub blobs: HashMap<String, String>,
    pub search_results: Vec<IssueRef>,
    pub issue_comments: HashMap<u64, Vec<Comment>>,
    pub reviews: HashMap<u64, Vec<Review>>,
    pub review_comments: HashMap<u64, Vec<Comment>>,
    /// (scope tag, comment id) → reactions
    pub reactions: HashMap<(u8, u64), Vec<Reaction>>,
    /// (head branch, pull)
    pub pulls: Vec<(String, PullRequestRef)>,
    pub defined_labels: HashSet<String>,
    pub issue_labels: HashMap<u64, BTreeSet<String>>,
    pub check_runs: HashMap<String, Vec<CheckRun>>,
    pub statuses: HashMap<String, CombinedStatus>,
    pub review_replies: Vec<(u64, u64, String)>,
    pub requested_reviewers: Vec<(u64, Vec<String>)>,
    next_id: u64,
}

fn scope_tag(scope: CommentScope) -> u8 {
    match scope {
        CommentScope::Issue => 0,
        CommentScope::Review => 1,
    }
}

pub struct FakeGithub {
    pub state: Mutex<FakeState>,
    /// Login attributed to everything the API writes (the bot's identity).
    pub login: String,
}

impl FakeGithub {
    pub fn new(login: &str) -> Self {
        let mut state = FakeState::default();
        state.repo = RepoInfo {
            default_branch: Some("main".to_string()),
            language: Some("Rust".to_string()),
        };
        Self {
            state: Mutex::new(state),
            login: login.to_string(),
        }
    }

    fn next_id(state: &mut FakeState) -> u64 {
        state.next_id += 1;
        state.next_id
    }

    /// Seeds `main` with one commit containing the given files.
    pub fn seed_repo(&self, files: &[(&str, &str)]) {
        let mut state = self.lock();
        let mut tree = BTreeMap::new();
        for (path, content) in files {
            let id = Self::next_id(&mut state);
            let blob_sha = format!("blob{id}");
            state.blobs.insert(blob_sha.clone(), content.to_string());
            tree.insert(path.to_string(), blob_sha);
        }
        let id = Self::next_id(&mut state);
        let tree_sha = format!("tree{id}");
        state.trees.insert(tree_sha.clone(), tree);
        let id = Self::next_id(&mut state);
        let commit_sha = format!("c{id}");
        state.commits.insert(
            commit_sha.clone(),
            FakeCommit {
                tree: tree_sha,
                parents: vec![],
                message: "seed".to_string(),
            },
        );
        state.refs.insert("main".to_string(), commit_sha);
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_issue_comment(&self, issue: u64, id: u64, author: &str, body: &str, minute: u32) {
        let mut state = self.lock();
        state.issue_comments.entry(issue).or_default().push(Comment {
            id,
            author: author.to_string(),
            body: body.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
            in_reply_to: None,
        });
    }

    pub fn add_reaction_from(&self, scope: CommentScope, comment_id: u64, author: &str) {
        let mut state = self.lock();
        state
            .reactions
            .entry((scope_tag(scope), comment_id))
            .or_default()
            .push(Reaction {
                author: author.to_string(),
                content: "+1".to_string(),
            });
    }

    pub fn add_pull(&self, head: &str, number: u64, author: &str, base: &str) {
        let mut state = self.lock();
        state.pulls.push((
            head.to_string(),
            PullRequestRef {
                owner: "acme".to_string(),
                repo: "widgets".to_string(),
                number,
                title: format!("pull {number}"),
                url: format!("https://example.test/pull/{number}"),
                base_branch: base.to_string(),
                author: author.to_string(),
            },
        ));
    }

    /// Content of `path` at the tip of `branch`, if present.
    pub fn file_at(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        let commit_sha = state.refs.get(branch)?;
        let commit = state.commits.get(commit_sha)?;
        let tree = state.trees.get(&commit.tree)?;
        let blob_sha = tree.get(path)?;
        state.blobs.get(blob_sha).cloned()
    }

    /// Number of commits reachable from the tip of `branch`.
    pub fn history_len(&self, branch: &str) -> usize {
        let state = self.lock();
        match state.refs.get(branch) {
            Some(sha) => reachable(&state, sha).len(),
            None => 0,
        }
    }

    pub fn issue_has_label(&self, issue: u64, label: &str) -> bool {
        self.lock()
            .issue_labels
            .get(&issue)
            .is_some_and(|l| l.contains(label))
    }

    pub fn comments_on(&self, issue: u64) -> Vec<Comment> {
        self.lock()
            .issue_comments
            .get(&issue)
            .cloned()
            .unwrap_or_default()
    }

    fn resolve_tree(state: &FakeState, reference: &str) -> Option<String> {
        let commit_sha = state
            .refs
            .get(reference)
            .cloned()
            .or_else(|| state.commits.contains_key(reference).then(|| reference.to_string()))?;
        state.commits.get(&commit_sha).map(|c| c.tree.clone())
    }
}

fn reachable(state: &FakeState, tip: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![tip.to_string()];
    while let Some(sha) = stack.pop() {
        if !seen.insert(sha.clone()) {
            continue;
        }
        if let Some(commit) = state.commits.get(&sha) {
            stack.extend(commit.parents.iter().cloned());
        }
    }
    seen
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn search_issues(&self, _query: &str) -> Result<Vec<IssueRef>, GithubError> {
        Ok(self.lock().search_results.clone())
    }

    async fn get_repo(&self, _owner: &str, _repo: &str) -> Result<RepoInfo, GithubError> {
        Ok(self.lock().repo.clone())
    }

    async fn get_readme(&self, _owner: &str, _repo: &str) -> Result<Option<String>, GithubError> {
        Ok(self.lock().readme.clone())
    }

    async fn get_file(
        &self,
        _owner: &str,
        _repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Option<String>, GithubError> {
        let state = self.lock();
        let Some(tree_sha) = FakeGithub::resolve_tree(&state, reference) else {
            return Ok(None);
        };
        let tree = state.trees.get(&tree_sha);
        Ok(tree
            .and_then(|t| t.get(path))
            .and_then(|sha| state.blobs.get(sha))
            .cloned())
    }

    async fn get_branch_tip(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
    ) -> Result<Option<CommitInfo>, GithubError> {
        let state = self.lock();
        let Some(sha) = state.refs.get(branch) else {
            return Ok(None);
        };
        let commit = state
            .commits
            .get(sha)
            .ok_or_else(|| GithubError::Protocol(format!("dangling ref {branch}")))?;
        Ok(Some(CommitInfo {
            sha: sha.clone(),
            tree_sha: commit.tree.clone(),
        }))
    }

    async fn create_ref(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        if state.refs.contains_key(branch) {
            return Err(GithubError::Protocol(format!("ref {branch} already exists")));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_ref(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        if !state.commits.contains_key(sha) {
            return Err(GithubError::Protocol(format!("unknown commit {sha}")));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn compare(
        &self,
        _owner: &str,
        _repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, GithubError> {
        let state = self.lock();
        let resolve = |name: &str| -> Result<String, GithubError> {
            state
                .refs
                .get(name)
                .cloned()
                .or_else(|| state.commits.contains_key(name).then(|| name.to_string()))
                .ok_or_else(|| GithubError::NotFound(format!("commit-ish {name}")))
        };
        let base_reach = reachable(&state, &resolve(base)?);
        let head_reach = reachable(&state, &resolve(head)?);
        Ok(Comparison {
            ahead_by: head_reach.difference(&base_reach).count() as u64,
            behind_by: base_reach.difference(&head_reach).count() as u64,
        })
    }

    async fn create_blob(
        &self,
        _owner: &str,
        _repo: &str,
        content: &str,
    ) -> Result<String, GithubError> {
        let mut state = self.lock();
        let id = FakeGithub::next_id(&mut state);
        let sha = format!("blob{id}");
        state.blobs.insert(sha.clone(), content.to_string());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        _owner: &str,
        _repo: &str,
        base_tree: &str,
        entries: &[TreeWriteEntry],
    ) -> Result<String, GithubError> {
        let mut state = self.lock();
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| GithubError::NotFound(format!("tree {base_tree}")))?;
        for entry in entries {
            match &entry.sha {
                Some(sha) => {
                    tree.insert(entry.path.clone(), sha.clone());
                }
                None => {
                    tree.remove(&entry.path);
                }
            }
        }
        let id = FakeGithub::next_id(&mut state);
        let sha = format!("tree{id}");
        state.trees.insert(sha.clone(), tree);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        _owner: &str,
        _repo: &str,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<CommitInfo, GithubError> {
        let mut state = self.lock();
        if !state.trees.contains_key(tree) {
            return Err(GithubError::NotFound(format!("tree {tree}")));
        }
        let id = FakeGithub::next_id(&mut state);
        let sha = format!("c{id}");
        state.commits.insert(
            sha.clone(),
            FakeCommit {
                tree: tree.to_string(),
                parents: parents.to_vec(),
                message: message.to_string(),
            },
        );
        Ok(CommitInfo {
            sha,
            tree_sha: tree.to_string(),
        })
    }

    async fn get_tree(
        &self,
        _owner: &str,
        _repo: &str,
        reference: &str,
    ) -> Result<(Vec<TreeEntry>, bool), GithubError> {
        let state = self.lock();
        let tree_sha = FakeGithub::resolve_tree(&state, reference)
            .ok_or_else(|| GithubError::NotFound(format!("commit-ish {reference}")))?;
        let tree = state
            .trees
            .get(&tree_sha)
            .ok_or_else(|| GithubError::NotFound(format!("tree {tree_sha}")))?;
        let entries = tree
            .iter()
            .map(|(path, sha)| TreeEntry {
                path: path.clone(),
                mode: "100644".to_string(),
                kind: "blob".to_string(),
                sha: sha.clone(),
            })
            .collect();
        Ok((entries, false))
    }

    async fn get_blob(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<String, GithubError> {
        self.lock()
            .blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| GithubError::NotFound(format!("blob {sha}")))
    }

    async fn list_issue_comments(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, GithubError> {
        Ok(self
            .lock()
            .issue_comments
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_pull_reviews(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, GithubError> {
        Ok(self.lock().reviews.get(&number).cloned().unwrap_or_default())
    }

    async fn list_review_comments(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, GithubError> {
        Ok(self
            .lock()
            .review_comments
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_open_pulls(
        &self,
        _owner: &str,
        _repo: &str,
        head_branch: &str,
        base: &str,
    ) -> Result<Vec<PullRequestRef>, GithubError> {
        Ok(self
            .lock()
            .pulls
            .iter()
            .filter(|(head, pull)| head == head_branch && pull.base_branch == base)
            .map(|(_, pull)| pull.clone())
            .collect())
    }

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        _body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestRef, GithubError> {
        let mut state = self.lock();
        let id = FakeGithub::next_id(&mut state);
        let number = 1000 + id;
        let pull = PullRequestRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
            title: title.to_string(),
            url: format!("https://example.test/pull/{number}"),
            base_branch: base.to_string(),
            author: self.login.clone(),
        };
        state.pulls.push((head.to_string(), pull.clone()));
        Ok(pull)
    }

    async fn request_reviewers(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<(), GithubError> {
        self.lock()
            .requested_reviewers
            .push((number, reviewers.to_vec()));
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        let id = FakeGithub::next_id(&mut state);
        let author = self.login.clone();
        state.issue_comments.entry(number).or_default().push(Comment {
            id,
            author,
            body: body.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            in_reply_to: None,
        });
        Ok(())
    }

    async fn create_review_reply(
        &self,
        _owner: &str,
        _repo: &str,
        pull_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        let exists = state
            .review_comments
            .get(&pull_number)
            .is_some_and(|comments| comments.iter().any(|c| c.id == comment_id));
        if !exists {
            return Err(GithubError::NotFound(format!(
                "review comment {comment_id}"
            )));
        }
        state
            .review_replies
            .push((pull_number, comment_id, body.to_string()));
        Ok(())
    }

    async fn list_comment_reactions(
        &self,
        _owner: &str,
        _repo: &str,
        scope: CommentScope,
        comment_id: u64,
    ) -> Result<Vec<Reaction>, GithubError> {
        Ok(self
            .lock()
            .reactions
            .get(&(scope_tag(scope), comment_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_comment_reaction(
        &self,
        _owner: &str,
        _repo: &str,
        scope: CommentScope,
        comment_id: u64,
        content: &str,
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        let author = self.login.clone();
        state
            .reactions
            .entry((scope_tag(scope), comment_id))
            .or_default()
            .push(Reaction {
                author,
                content: content.to_string(),
            });
        Ok(())
    }

    async fn ensure_label(
        &self,
        _owner: &str,
        _repo: &str,
        label: &LabelSpec,
    ) -> Result<(), GithubError> {
        self.lock().defined_labels.insert(label.name.to_string());
        Ok(())
    }

    async fn add_labels(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        names: &[&str],
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        let labels = state.issue_labels.entry(number).or_default();
        for name in names {
            labels.insert(name.to_string());
        }
        Ok(())
    }

    async fn remove_label(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        name: &str,
    ) -> Result<(), GithubError> {
        let mut state = self.lock();
        if let Some(labels) = state.issue_labels.get_mut(&number) {
            labels.remove(name);
        }
        Ok(())
    }

    async fn list_check_runs(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<Vec<CheckRun>, GithubError> {
        Ok(self.lock().check_runs.get(sha).cloned().unwrap_or_default())
    }

    async fn combined_status(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, GithubError> {
        Ok(self.lock().statuses.get(sha).cloned().unwrap_or_default())
    }
}

/// Validator that always succeeds, recording every commit it saw.
#[derive(Default)]
pub struct AlwaysPassValidator {
    pub validated: Mutex<Vec<String>>,
}

#[async_trait]
impl CommitValidator for AlwaysPassValidator {
    async fn validate(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<ValidationOutcome, ValidationError> {
        self.validated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sha.to_string());
        Ok(ValidationOutcome {
            succeeded: true,
            details: "always pass".to_string(),
        })
    }
}

/// A ready-made issue in the fake's `acme/widgets` repository.
pub fn sample_issue(number: u64, title: &str) -> IssueRef {
    IssueRef {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        number,
        title: title.to_string(),
        body: "Please fix this.".to_string(),
        url: format!("https://example.test/issues/{number}"),
        author: "alice".to_string(),
    }
}

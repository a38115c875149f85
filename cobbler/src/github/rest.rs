//! Octocrab-backed [`GithubApi`] implementation.
//!
//! The typed octocrab surface does not cover the git-data write routes this
//! engine lives on (blobs, tree deltas, commits, ref updates), so everything
//! goes through octocrab's generic verbs with local wire models. Octocrab
//! still supplies auth, routing, and retry-after handling.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    api_status, CheckRun, CombinedStatus, Comment, CommentScope, CommitInfo, Comparison,
    GithubApi, GithubError, IssueRef, LabelSpec, PullRequestRef, Reaction, RepoInfo, Review,
    TreeEntry, TreeWriteEntry,
};

const PER_PAGE: u8 = 100;

pub struct RestClient {
    octo: octocrab::Octocrab,
}

impl RestClient {
    pub fn new(octo: octocrab::Octocrab) -> Self {
        Self { octo }
    }
}

// -- wire models --

#[derive(Deserialize)]
struct Actor {
    login: String,
}

#[derive(Deserialize)]
struct SearchResults {
    items: Vec<SearchIssue>,
}

#[derive(Deserialize)]
struct SearchIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    repository_url: String,
    user: Actor,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RepoWire {
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize)]
struct EncodedContent {
    content: String,
}

#[derive(Deserialize)]
struct RefWire {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct CommitWire {
    sha: String,
    tree: TreeRef,
}

#[derive(Deserialize)]
struct TreeRef {
    sha: String,
}

#[derive(Deserialize)]
struct ShaWire {
    sha: String,
}

#[derive(Deserialize)]
struct TreeListing {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct IssueCommentWire {
    id: u64,
    user: Actor,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ReviewCommentWire {
    id: u64,
    user: Actor,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    in_reply_to_id: Option<u64>,
}

#[derive(Deserialize)]
struct ReviewWire {
    id: u64,
    user: Actor,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct PullWire {
    number: u64,
    title: String,
    html_url: String,
    base: BaseRef,
    user: Actor,
}

#[derive(Deserialize)]
struct BaseRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct ReactionWire {
    user: Actor,
    content: String,
}

#[derive(Deserialize)]
struct CheckRunsWire {
    #[serde(default)]
    check_runs: Vec<CheckRunWire>,
}

#[derive(Deserialize)]
struct CheckRunWire {
    name: String,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct CombinedStatusWire {
    state: String,
    #[serde(default)]
    total_count: u64,
}

fn decode_content(encoded: &str) -> Result<String, GithubError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GithubError::Protocol(format!("invalid base64 content: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `https://api.github.com/repos/OWNER/REPO` → `(OWNER, REPO)`.
fn split_repository_url(url: &str) -> Result<(String, String), GithubError> {
    let mut parts = url.trim_end_matches('/').rsplit('/');
    match (parts.next(), parts.next()) {
        (Some(repo), Some(owner)) if !repo.is_empty() && !owner.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(GithubError::Protocol(format!(
            "unparseable repository url: {url}"
        ))),
    }
}

fn not_found_to_none<T>(result: Result<T, octocrab::Error>) -> Result<Option<T>, GithubError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if api_status(&e) == Some(404) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl RestClient {
    async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CommitInfo, GithubError> {
        let commit: CommitWire = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/git/commits/{sha}"),
                None::<&()>,
            )
            .await?;
        Ok(CommitInfo {
            sha: commit.sha,
            tree_sha: commit.tree.sha,
        })
    }

    async fn paginated<T: serde::de::DeserializeOwned>(
        &self,
        route: &str,
    ) -> Result<Vec<T>, GithubError> {
        let mut out = Vec::new();
        for page in 1u32.. {
            let batch: Vec<T> = self
                .octo
                .get(
                    route,
                    Some(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]),
                )
                .await?;
            let len = batch.len();
            out.extend(batch);
            if len < PER_PAGE as usize {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl GithubApi for RestClient {
    async fn search_issues(&self, query: &str) -> Result<Vec<IssueRef>, GithubError> {
        let results: SearchResults = self
            .octo
            .get(
                "/search/issues",
                Some(&[("q", query), ("per_page", "50")]),
            )
            .await?;
        let mut issues = Vec::new();
        for item in results.items {
            if item.pull_request.is_some() {
                continue;
            }
            let (owner, repo) = split_repository_url(&item.repository_url)?;
            issues.push(IssueRef {
                owner,
                repo,
                number: item.number,
                title: item.title,
                body: item.body.unwrap_or_default(),
                url: item.html_url,
                author: item.user.login,
            });
        }
        Ok(issues)
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<RepoInfo, GithubError> {
        let wire: RepoWire = self
            .octo
            .get(format!("/repos/{owner}/{repo}"), None::<&()>)
            .await?;
        Ok(RepoInfo {
            default_branch: wire.default_branch,
            language: wire.language,
        })
    }

    async fn get_readme(&self, owner: &str, repo: &str) -> Result<Option<String>, GithubError> {
        let result: Result<EncodedContent, octocrab::Error> = self
            .octo
            .get(format!("/repos/{owner}/{repo}/readme"), None::<&()>)
            .await;
        let wire = not_found_to_none(result)?;
        wire.map(|w| decode_content(&w.content)).transpose()
    }

    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Option<String>, GithubError> {
        let result: Result<serde_json::Value, octocrab::Error> = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/contents/{path}"),
                Some(&[("ref", reference)]),
            )
            .await;
        let wire = not_found_to_none(result)?;
        match wire {
            Some(serde_json::Value::Object(obj)) => match obj.get("content") {
                Some(serde_json::Value::String(encoded)) => {
                    Ok(Some(decode_content(encoded)?))
                }
                _ => Ok(None),
            },
            // A directory listing (array) is not a file.
            _ => Ok(None),
        }
    }

    async fn get_branch_tip(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<CommitInfo>, GithubError> {
        let result: Result<RefWire, octocrab::Error> = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/git/ref/heads/{branch}"),
                None::<&()>,
            )
            .await;
        let wire = not_found_to_none(result)?;
        match wire {
            Some(r) => Ok(Some(self.get_commit(owner, repo, &r.object.sha).await?)),
            None => Ok(None),
        }
    }

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError> {
        let _: serde_json::Value = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/git/refs"),
                Some(&serde_json::json!({
                    "ref": format!("refs/heads/{branch}"),
                    "sha": sha,
                })),
            )
            .await?;
        Ok(())
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GithubError> {
        let _: serde_json::Value = self
            .octo
            .patch(
                format!("/repos/{owner}/{repo}/git/refs/heads/{branch}"),
                Some(&serde_json::json!({ "sha": sha, "force": false })),
            )
            .await?;
        Ok(())
    }

    async fn compare(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, GithubError> {
        let cmp: Comparison = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/compare/{base}...{head}"),
                None::<&()>,
            )
            .await?;
        Ok(cmp)
    }

    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &str,
    ) -> Result<String, GithubError> {
        let wire: ShaWire = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/git/blobs"),
                Some(&serde_json::json!({ "content": content, "encoding": "utf-8" })),
            )
            .await?;
        Ok(wire.sha)
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeWriteEntry],
    ) -> Result<String, GithubError> {
        let wire: ShaWire = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/git/trees"),
                Some(&serde_json::json!({ "base_tree": base_tree, "tree": entries })),
            )
            .await?;
        Ok(wire.sha)
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<CommitInfo, GithubError> {
        let wire: CommitWire = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/git/commits"),
                Some(&serde_json::json!({
                    "message": message,
                    "tree": tree,
                    "parents": parents,
                })),
            )
            .await?;
        Ok(CommitInfo {
            sha: wire.sha,
            tree_sha: wire.tree.sha,
        })
    }

    async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<(Vec<TreeEntry>, bool), GithubError> {
        let listing: TreeListing = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/git/trees/{reference}"),
                Some(&[("recursive", "1")]),
            )
            .await?;
        Ok((listing.tree, listing.truncated))
    }

    async fn get_blob(&self, owner: &str, repo: &str, sha: &str) -> Result<String, GithubError> {
        let wire: EncodedContent = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/git/blobs/{sha}"),
                None::<&()>,
            )
            .await?;
        decode_content(&wire.content)
    }

    async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, GithubError> {
        let wires: Vec<IssueCommentWire> = self
            .paginated(&format!("/repos/{owner}/{repo}/issues/{number}/comments"))
            .await?;
        Ok(wires
            .into_iter()
            .map(|w| Comment {
                id: w.id,
                author: w.user.login,
                body: w.body.unwrap_or_default(),
                created_at: w.created_at,
                in_reply_to: None,
            })
            .collect())
    }

    async fn list_pull_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, GithubError> {
        let wires: Vec<ReviewWire> = self
            .paginated(&format!("/repos/{owner}/{repo}/pulls/{number}/reviews"))
            .await?;
        Ok(wires
            .into_iter()
            .map(|w| Review {
                id: w.id,
                author: w.user.login,
                body: w.body.unwrap_or_default(),
                state: w.state,
                submitted_at: w.submitted_at,
            })
            .collect())
    }

    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, GithubError> {
        let wires: Vec<ReviewCommentWire> = self
            .paginated(&format!("/repos/{owner}/{repo}/pulls/{number}/comments"))
            .await?;
        Ok(wires
            .into_iter()
            .map(|w| Comment {
                id: w.id,
                author: w.user.login,
                body: w.body.unwrap_or_default(),
                created_at: w.created_at,
                in_reply_to: w.in_reply_to_id,
            })
            .collect())
    }

    async fn list_open_pulls(
        &self,
        owner: &str,
        repo: &str,
        head_branch: &str,
        base: &str,
    ) -> Result<Vec<PullRequestRef>, GithubError> {
        let wires: Vec<PullWire> = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/pulls"),
                Some(&[
                    ("state", "open"),
                    ("head", &format!("{owner}:{head_branch}")),
                    ("base", base),
                    ("per_page", "100"),
                ]),
            )
            .await?;
        Ok(wires
            .into_iter()
            .map(|w| PullRequestRef {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number: w.number,
                title: w.title,
                url: w.html_url,
                base_branch: w.base.name,
                author: w.user.login,
            })
            .collect())
    }

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestRef, GithubError> {
        let wire: PullWire = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/pulls"),
                Some(&serde_json::json!({
                    "title": title,
                    "body": body,
                    "head": head,
                    "base": base,
                })),
            )
            .await?;
        Ok(PullRequestRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number: wire.number,
            title: wire.title,
            url: wire.html_url,
            base_branch: wire.base.name,
            author: wire.user.login,
        })
    }

    async fn request_reviewers(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<(), GithubError> {
        let _: serde_json::Value = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/pulls/{number}/requested_reviewers"),
                Some(&serde_json::json!({ "reviewers": reviewers })),
            )
            .await?;
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), GithubError> {
        let _: serde_json::Value = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/issues/{number}/comments"),
                Some(&serde_json::json!({ "body": body })),
            )
            .await?;
        Ok(())
    }

    async fn create_review_reply(
        &self,
        owner: &str,
        repo: &str,
        pull_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<(), GithubError> {
        let result: Result<serde_json::Value, _> = self
            .octo
            .post(
                format!(
                    "/repos/{owner}/{repo}/pulls/{pull_number}/comments/{comment_id}/replies"
                ),
                Some(&serde_json::json!({ "body": body })),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if api_status(&e) == Some(404) => Err(GithubError::NotFound(format!(
                "review comment {comment_id}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_comment_reactions(
        &self,
        owner: &str,
        repo: &str,
        scope: CommentScope,
        comment_id: u64,
    ) -> Result<Vec<Reaction>, GithubError> {
        let route = match scope {
            CommentScope::Issue => {
                format!("/repos/{owner}/{repo}/issues/comments/{comment_id}/reactions")
            }
            CommentScope::Review => {
                format!("/repos/{owner}/{repo}/pulls/comments/{comment_id}/reactions")
            }
        };
        let wires: Vec<ReactionWire> = self.paginated(&route).await?;
        Ok(wires
            .into_iter()
            .map(|w| Reaction {
                author: w.user.login,
                content: w.content,
            })
            .collect())
    }

    async fn create_comment_reaction(
        &self,
        owner: &str,
        repo: &str,
        scope: CommentScope,
        comment_id: u64,
        content: &str,
    ) -> Result<(), GithubError> {
        let route = match scope {
            CommentScope::Issue => {
                format!("/repos/{owner}/{repo}/issues/comments/{comment_id}/reactions")
            }
            CommentScope::Review => {
                format!("/repos/{owner}/{repo}/pulls/comments/{comment_id}/reactions")
            }
        };
        let result: Result<serde_json::Value, _> = self
            .octo
            .post(route, Some(&serde_json::json!({ "content": content })))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if api_status(&e) == Some(404) => {
                Err(GithubError::NotFound(format!("comment {comment_id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_label(
        &self,
        owner: &str,
        repo: &str,
        label: &LabelSpec,
    ) -> Result<(), GithubError> {
        let result: Result<serde_json::Value, octocrab::Error> = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/labels/{}", label.name),
                None::<&()>,
            )
            .await;
        let existing = not_found_to_none(result)?;
        if existing.is_some() {
            return Ok(());
        }
        let _: serde_json::Value = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/labels"),
                Some(&serde_json::json!({
                    "name": label.name,
                    "color": label.color,
                    "description": label.description,
                })),
            )
            .await?;
        Ok(())
    }

    async fn add_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        names: &[&str],
    ) -> Result<(), GithubError> {
        let _: serde_json::Value = self
            .octo
            .post(
                format!("/repos/{owner}/{repo}/issues/{number}/labels"),
                Some(&serde_json::json!({ "labels": names })),
            )
            .await?;
        Ok(())
    }

    async fn remove_label(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        name: &str,
    ) -> Result<(), GithubError> {
        let result: Result<serde_json::Value, _> = self
            .octo
            .delete(
                format!("/repos/{owner}/{repo}/issues/{number}/labels/{name}"),
                None::<&()>,
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if api_status(&e) == Some(404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_check_runs(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CheckRun>, GithubError> {
        let wire: CheckRunsWire = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/commits/{sha}/check-runs"),
                Some(&[("per_page", "100")]),
            )
            .await?;
        Ok(wire
            .check_runs
            .into_iter()
            .map(|w| CheckRun {
                name: w.name,
                status: w.status,
                conclusion: w.conclusion,
            })
            .collect())
    }

    async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, GithubError> {
        let wire: CombinedStatusWire = self
            .octo
            .get(
                format!("/repos/{owner}/{repo}/commits/{sha}/status"),
                None::<&()>,
            )
            .await?;
        Ok(CombinedStatus {
            state: wire.state,
            total_count: wire.total_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_repository_url_extracts_owner_and_repo() {
        let (owner, repo) =
            split_repository_url("https://api.github.com/repos/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn split_repository_url_rejects_garbage() {
        assert!(split_repository_url("").is_err());
    }

    #[test]
    fn decode_content_handles_wrapped_base64() {
        // The contents API inserts newlines every 60 chars.
        let encoded = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_content(encoded).unwrap(), "hello world");
    }

    #[test]
    fn decode_content_rejects_invalid_base64() {
        assert!(decode_content("!!!").is_err());
    }
}

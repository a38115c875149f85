//! Commit validation: the `validate(commit) → outcome` contract consumed by
//! the workspace, plus an implementation that polls the platform's check
//! runs and combined status until everything attached to the commit settles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::github::{CheckRun, CombinedStatus, GithubApi, GithubError};

/// Result of validating one commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub succeeded: bool,
    pub details: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Validation did not settle within the configured budget. Task-fatal.
    #[error("validation timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Github(#[from] GithubError),
}

#[async_trait]
pub trait CommitValidator: Send + Sync {
    async fn validate(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<ValidationOutcome, ValidationError>;
}

/// Polls check runs and the combined status for a commit. A commit with no
/// checks configured validates trivially, which is what makes the agent
/// loop's opening no-commit validation safe on a fresh branch.
pub struct ChecksValidator {
    api: Arc<dyn GithubApi>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ChecksValidator {
    pub fn new(api: Arc<dyn GithubApi>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            api,
            poll_interval,
            timeout,
        }
    }
}

#[async_trait]
impl CommitValidator for ChecksValidator {
    async fn validate(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<ValidationOutcome, ValidationError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let runs = self.api.list_check_runs(owner, repo, sha).await?;
            let status = self.api.combined_status(owner, repo, sha).await?;
            if let Some(outcome) = settle(&runs, &status) {
                info!(sha, succeeded = outcome.succeeded, "validation settled");
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Err(ValidationError::Timeout(self.timeout));
            }
            debug!(sha, pending = runs.len(), "validation pending, polling");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// `None` while anything is still running; otherwise the settled outcome.
fn settle(runs: &[CheckRun], status: &CombinedStatus) -> Option<ValidationOutcome> {
    if runs.iter().any(|r| r.status != "completed") {
        return None;
    }
    if status.total_count > 0 && status.state == "pending" {
        return None;
    }

    let mut failures: Vec<String> = runs
        .iter()
        .filter(|r| {
            !matches!(
                r.conclusion.as_deref(),
                Some("success") | Some("neutral") | Some("skipped")
            )
        })
        .map(|r| {
            format!(
                "check '{}' concluded {}",
                r.name,
                r.conclusion.as_deref().unwrap_or("without a conclusion")
            )
        })
        .collect();
    if status.total_count > 0 && status.state != "success" {
        failures.push(format!("combined status is {}", status.state));
    }

    if failures.is_empty() {
        let details = if runs.is_empty() && status.total_count == 0 {
            "no checks configured for this commit".to_string()
        } else {
            format!("{} check(s) passed", runs.len())
        };
        Some(ValidationOutcome {
            succeeded: true,
            details,
        })
    } else {
        Some(ValidationOutcome {
            succeeded: false,
            details: failures.join("; "),
        })
    }
}

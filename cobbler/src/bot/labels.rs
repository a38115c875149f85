//! The three labels the bot manages, with fixed colors and descriptions.
//! Created on demand in each repository the bot touches.

use crate::github::{GithubApi, GithubError, IssueRef, LabelSpec};

/// Applied while the bot is actively working an issue; excludes the issue
/// from the next search cycle.
pub const WORKING: LabelSpec = LabelSpec {
    name: "bot-working",
    color: "1d76db",
    description: "The bot is currently working on this issue",
};

/// Applied when a task dies fatally. The bot never touches a blocked issue
/// again until a human removes this label.
pub const BLOCKED: LabelSpec = LabelSpec {
    name: "bot-blocked",
    color: "b60205",
    description: "The bot hit an error on this issue and needs human help",
};

/// Indicates the bot owes the next action; removed on natural end of a
/// conversation.
pub const TURN: LabelSpec = LabelSpec {
    name: "bot-turn",
    color: "0e8a16",
    description: "The bot owes the next action on this issue",
};

/// Makes sure all three labels exist in the issue's repository.
pub async fn ensure_all(api: &dyn GithubApi, issue: &IssueRef) -> Result<(), GithubError> {
    for label in [&WORKING, &BLOCKED, &TURN] {
        api.ensure_label(&issue.owner, &issue.repo, label).await?;
    }
    Ok(())
}

pub async fn add(
    api: &dyn GithubApi,
    issue: &IssueRef,
    label: &LabelSpec,
) -> Result<(), GithubError> {
    api.add_labels(&issue.owner, &issue.repo, issue.number, &[label.name])
        .await
}

pub async fn remove(
    api: &dyn GithubApi,
    issue: &IssueRef,
    label: &LabelSpec,
) -> Result<(), GithubError> {
    api.remove_label(&issue.owner, &issue.repo, issue.number, label.name)
        .await
}

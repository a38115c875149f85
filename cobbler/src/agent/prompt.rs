//! Prompt text for the agent conversation.
//!
//! The initial message is two blocks: repository context first (stable per
//! repository, so the provider can cache the prefix), then the task-specific
//! context.

use std::fmt::Write as _;

use crate::task::Task;

pub const SYSTEM_PROMPT: &str = "\
You are an autonomous software engineer working on GitHub issues assigned to \
you. You operate on a remote working tree through tools; you cannot run code \
or shell commands.

Workflow:
1. Understand the issue and explore the repository with text_editor view and \
search_in_file.
2. Make focused edits with text_editor and delete_file. Edits are staged \
locally until validated.
3. Run validate_changes with a commit message to commit staged edits and run \
the project's checks. Fix failures and validate again.
4. When validation passes, publish_changes_for_review with a clear title and \
a body that references the issue (e.g. \"Fixes #123\").
5. Acknowledge every comment you handle with add_reaction, and reply with \
post_comment where a human asked you something.

Rules:
- Keep changes minimal and in the repository's existing style.
- Never publish unvalidated changes.
- If part of the task is impossible for you, use report_limitation instead \
of guessing.
- When you are done (or there is nothing to do), finish your turn with a \
short summary and no tool use.";

/// Sent when the conversation has grown past its token budget.
pub const SUMMARY_REQUEST: &str = "\
This conversation is getting long. Summarize the work so far: the goal, \
what has been changed and validated, what is published, and what remains. \
Reply with the summary only; do not use any tools.";

/// The pending user message after a summarization rewrite.
pub const RESUME_REQUEST: &str = "\
Continue working on the task using the summary above as your memory of \
everything before it.";

const COMMENT_BODY_CAP: usize = 1000;

/// Stable, per-repository context block.
pub fn repo_context(task: &Task) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Repository: {}/{}",
        task.issue.owner, task.issue.repo
    );
    if let Some(language) = &task.summary.language {
        let _ = writeln!(out, "Main language: {language}");
    }
    let _ = writeln!(out, "Default branch: {}", task.target_branch);
    if !task.summary.file_tree.is_empty() {
        let _ = writeln!(out, "\n## Files");
        for path in &task.summary.file_tree {
            let _ = writeln!(out, "{path}");
        }
        if task.summary.tree_truncated {
            let _ = writeln!(out, "... (tree truncated)");
        }
    }
    if let Some(readme) = &task.summary.readme_excerpt {
        let _ = writeln!(out, "\n## README (excerpt)\n{readme}");
    }
    for (path, text) in &task.style_guides {
        let _ = writeln!(out, "\n## Style guide: {path}\n{text}");
    }
    out
}

/// Task-specific context block: the issue, branch state, and conversation.
pub fn task_context(task: &Task) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Issue #{}: {}\n{}\n",
        task.issue.number, task.issue.title, task.issue.url
    );
    if task.issue.body.is_empty() {
        let _ = writeln!(out, "(no description)");
    } else {
        let _ = writeln!(out, "{}", task.issue.body);
    }
    let _ = writeln!(
        out,
        "\nOpened by @{}. Work branch: {}. Review branch: {}.",
        task.issue.author, task.work_branch, task.source_branch
    );
    match &task.pull {
        Some(pull) => {
            let _ = writeln!(
                out,
                "Open pull request #{} into {}: {}",
                pull.number, pull.base_branch, pull.url
            );
        }
        None => {
            let _ = writeln!(out, "No pull request exists yet.");
        }
    }
    let _ = writeln!(
        out,
        "Unpublished validated changes: {}.",
        if task.has_unpublished_changes { "yes" } else { "no" }
    );
    if let Some(validation) = &task.validation {
        let _ = writeln!(
            out,
            "Current work-branch validation: {} ({}).",
            if validation.succeeded { "passing" } else { "FAILING" },
            validation.details
        );
    }

    if !task.comments.issue.is_empty() {
        let _ = writeln!(out, "\n## Issue comments");
        for comment in &task.comments.issue {
            append_comment(&mut out, comment.id, &comment.author, &comment.body);
        }
    }
    if !task.comments.reviews.is_empty() {
        let _ = writeln!(out, "\n## Reviews");
        for review in &task.comments.reviews {
            let _ = writeln!(
                out,
                "- [review {}] @{} ({}): {}",
                review.id,
                review.author,
                review.state,
                clip(&review.body)
            );
        }
    }
    if !task.comments.review_threads.is_empty() {
        let _ = writeln!(out, "\n## Review comment threads");
        for (root, thread) in &task.comments.review_threads {
            let _ = writeln!(out, "Thread {root}:");
            for comment in thread {
                append_comment(&mut out, comment.id, &comment.author, &comment.body);
            }
        }
    }

    let pending: Vec<u64> = task
        .comments
        .issue_requiring_response
        .iter()
        .chain(task.comments.review_requiring_response.iter())
        .copied()
        .collect();
    if pending.is_empty() {
        let _ = writeln!(out, "\nNo comments are waiting on you.");
    } else {
        let _ = writeln!(
            out,
            "\nComments waiting on you (react to each once handled): {pending:?}"
        );
    }
    out
}

fn append_comment(out: &mut String, id: u64, author: &str, body: &str) {
    let _ = writeln!(out, "- [id {id}] @{author}: {}", clip(body));
}

fn clip(body: &str) -> String {
    if body.chars().count() <= COMMENT_BODY_CAP {
        body.to_string()
    } else {
        let clipped: String = body.chars().take(COMMENT_BODY_CAP).collect();
        format!("{clipped}…")
    }
}

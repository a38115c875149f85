//! The per-task agent loop: resume or open the conversation, dispatch tool
//! uses, persist after every response, end on natural termination.
//!
//! Persistence ordering is the crash-safety contract: the history on disk is
//! always from *before* the current response's tool dispatch began, so a
//! restart replays local effects and never repeats remote ones.

pub mod prompt;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bot::labels;
use crate::conversation::store::{HistoryStore, StoreError};
use crate::conversation::Conversation;
use crate::github::{GithubApi, GithubError};
use crate::llm::{AssistantResponse, ContentBlock, LlmClient, LlmError, StopReason};
use crate::task::Task;
use crate::tools::{ToolContext, ToolError, ToolRegistry};
use crate::validate::CommitValidator;
use crate::workspace::{Workspace, WorkspaceConfig, WorkspaceError};

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Upper bound on loop iterations per task.
    pub max_iterations: u32,
    /// Cumulative input tokens before the history is rewritten around a
    /// summary. Zero disables summarization.
    pub summarize_threshold: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            summarize_threshold: 150_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Github(#[from] GithubError),
    #[error("tool {name}: {reason}")]
    Tool { name: String, reason: String },
    #[error("replay of {name}: {reason}")]
    Replay { name: String, reason: String },
    #[error("model stopped with {0:?}")]
    BadStop(StopReason),
    #[error("iteration limit of {0} exceeded")]
    IterationLimit(u32),
    /// Clean unwind on shutdown; the bot does not treat this as task-fatal.
    #[error("cancelled")]
    Cancelled,
}

pub struct Agent {
    github: Arc<dyn GithubApi>,
    llm: Arc<dyn LlmClient>,
    validator: Arc<dyn CommitValidator>,
    store: HistoryStore,
    registry: ToolRegistry,
    bot_login: String,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        github: Arc<dyn GithubApi>,
        llm: Arc<dyn LlmClient>,
        validator: Arc<dyn CommitValidator>,
        store: HistoryStore,
        registry: ToolRegistry,
        bot_login: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        Self {
            github,
            llm,
            validator,
            store,
            registry,
            bot_login: bot_login.into(),
            config,
        }
    }

    /// Runs the loop for one task to completion, error, or cancellation.
    /// The persisted conversation is deleted only on natural termination.
    pub async fn run_task(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let mut workspace = Workspace::open(
            Arc::clone(&self.github),
            Arc::clone(&self.validator),
            WorkspaceConfig {
                owner: task.issue.owner.clone(),
                repo: task.issue.repo.clone(),
                target_branch: task.target_branch.clone(),
                work_branch: task.work_branch.clone(),
                review_branch: task.source_branch.clone(),
                bot_login: self.bot_login.clone(),
                reviewer: Some(task.issue.author.clone()),
            },
        )
        .await?;

        // The model's first view must be truthful: real unpublished-change
        // state and a validation result for the current tip. The overlay is
        // empty here, so the nil-message validation cannot reject.
        task.has_unpublished_changes = workspace.has_unpublished_changes().await?;
        task.validation = Some(workspace.validate_changes(None).await?);

        let issue_number = task.issue.number;
        let mut conversation;
        let mut current: AssistantResponse;
        match self.store.load(issue_number)? {
            Some(history) => {
                info!(issue = issue_number, turns = history.turns.len(), "resuming conversation");
                conversation = Conversation::resume(
                    Arc::clone(&self.llm),
                    self.registry.specs(),
                    history,
                    self.config.summarize_threshold,
                );
                self.replay(&conversation, &mut workspace, task).await?;
                let last = conversation.turns().last().and_then(|t| t.assistant.clone());
                current = match last {
                    Some(response) => response,
                    None => conversation.send_pending().await?,
                };
            }
            None => {
                info!(issue = issue_number, "starting new conversation");
                conversation = Conversation::new(
                    Arc::clone(&self.llm),
                    prompt::SYSTEM_PROMPT,
                    self.registry.specs(),
                    self.config.summarize_threshold,
                );
                current = conversation
                    .send_message(vec![
                        ContentBlock::text(prompt::repo_context(task)),
                        ContentBlock::text(prompt::task_context(task)),
                    ])
                    .await?;
            }
        }

        for iteration in 0..self.config.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            self.store.save(issue_number, &conversation.history())?;

            match current.stop_reason.clone() {
                StopReason::EndTurn => {
                    info!(issue = issue_number, iteration, "conversation ended naturally");
                    self.store.delete(issue_number)?;
                    self.github
                        .remove_label(
                            &task.issue.owner,
                            &task.issue.repo,
                            issue_number,
                            labels::TURN.name,
                        )
                        .await?;
                    return Ok(());
                }
                StopReason::ToolUse => {
                    let mut followup = self.dispatch(&current, &mut workspace, task).await?;
                    if conversation.needs_summarization() {
                        followup.push(ContentBlock::text(prompt::SUMMARY_REQUEST));
                        let summary = conversation.send_message(followup).await?;
                        debug!(
                            issue = issue_number,
                            summary_len = summary.text().len(),
                            "history rewritten around summary"
                        );
                        conversation.compact(prompt::RESUME_REQUEST);
                        current = conversation.send_pending().await?;
                    } else {
                        current = conversation.send_message(followup).await?;
                    }
                }
                reason @ (StopReason::MaxTokens | StopReason::Refusal | StopReason::Other(_)) => {
                    return Err(AgentError::BadStop(reason));
                }
            }
        }
        Err(AgentError::IterationLimit(self.config.max_iterations))
    }

    /// Dispatches every tool use of the response sequentially, in issue
    /// order, and returns the tool-result blocks in the same order. Input
    /// errors become `is_error` results; fatal errors abort the task.
    async fn dispatch(
        &self,
        response: &AssistantResponse,
        workspace: &mut Workspace,
        task: &Task,
    ) -> Result<Vec<ContentBlock>, AgentError> {
        let uses: Vec<(String, String, serde_json::Value)> = response
            .tool_uses()
            .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
            .collect();
        let mut results = Vec::with_capacity(uses.len());
        for (id, name, input) in uses {
            let mut ctx = ToolContext {
                workspace: &mut *workspace,
                github: self.github.as_ref(),
                task,
            };
            match self.registry.run(&name, input, &mut ctx).await {
                Ok(text) => {
                    debug!(tool = %name, "tool succeeded");
                    results.push(ContentBlock::tool_result(id, text));
                }
                Err(ToolError::Input(reason)) => {
                    debug!(tool = %name, reason = %reason, "tool input error returned to model");
                    results.push(ContentBlock::tool_error(id, reason));
                }
                Err(ToolError::Fatal(reason)) => {
                    return Err(AgentError::Tool { name, reason });
                }
            }
        }
        Ok(results)
    }

    /// Re-applies local effects of every tool use in every turn except the
    /// last. The last turn is live: its response (or pending user message)
    /// is where the loop picks up.
    async fn replay(
        &self,
        conversation: &Conversation,
        workspace: &mut Workspace,
        task: &Task,
    ) -> Result<(), AgentError> {
        let turns = conversation.turns();
        if turns.len() < 2 {
            return Ok(());
        }
        let mut replayed = 0usize;
        for turn in &turns[..turns.len() - 1] {
            let Some(response) = &turn.assistant else {
                continue;
            };
            let uses: Vec<(String, serde_json::Value)> = response
                .tool_uses()
                .map(|(_, name, input)| (name.to_string(), input.clone()))
                .collect();
            for (name, input) in uses {
                let mut ctx = ToolContext {
                    workspace: &mut *workspace,
                    github: self.github.as_ref(),
                    task,
                };
                self.registry
                    .replay(&name, input, &mut ctx)
                    .await
                    .map_err(|e| AgentError::Replay {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                replayed += 1;
            }
        }
        if replayed > 0 {
            info!(count = replayed, "replayed recorded tool uses");
        }
        Ok(())
    }
}

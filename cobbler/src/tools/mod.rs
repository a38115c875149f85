//! Tool registry: the named operations the model drives.
//!
//! Every tool declares an [`Effect`] class that encodes what happens on
//! conversation replay after a crash: overlay mutations are reproducible
//! from the recorded invocation alone, remote side effects must never be
//! re-issued because the conversation already holds their textual outcome.
//!
//! Errors split two ways. [`ToolError::Input`] is deterministic and
//! recoverable: it is surfaced to the model as an `is_error` tool result so
//! it can retry with corrected arguments, and no side effects have occurred.
//! [`ToolError::Fatal`] aborts the agent loop for the task.

mod add_reaction;
mod delete_file;
mod post_comment;
mod publish;
mod report_limitation;
mod search_in_file;
mod text_editor;
mod validate_changes;

pub use add_reaction::AddReactionTool;
pub use delete_file::DeleteFileTool;
pub use post_comment::PostCommentTool;
pub use publish::PublishChangesTool;
pub use report_limitation::ReportLimitationTool;
pub use search_in_file::SearchInFileTool;
pub use text_editor::TextEditorTool;
pub use validate_changes::ValidateChangesTool;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::github::{GithubApi, GithubError};
use crate::llm::ToolSpec;
use crate::task::Task;
use crate::workspace::{Workspace, WorkspaceError};

/// What a tool does to the world, driving its default replay behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Reads only; replay is a no-op.
    ReadOnly,
    /// Mutates the in-memory overlay; replay re-applies the mutation.
    Overlay,
    /// Commits the overlay remotely; replay re-establishes the post-commit
    /// local state without touching the remote.
    Commit,
    /// Persistent remote side effect; replay is a no-op.
    Remote,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Deterministic and recoverable by the model fixing its arguments.
    #[error("{0}")]
    Input(String),
    /// Aborts the agent loop for this task.
    #[error("{0}")]
    Fatal(String),
}

impl From<WorkspaceError> for ToolError {
    fn from(e: WorkspaceError) -> Self {
        if e.is_input_error() {
            ToolError::Input(e.to_string())
        } else {
            ToolError::Fatal(e.to_string())
        }
    }
}

impl From<GithubError> for ToolError {
    fn from(e: GithubError) -> Self {
        match e {
            GithubError::NotFound(what) => ToolError::Input(format!("not found: {what}")),
            other => ToolError::Fatal(other.to_string()),
        }
    }
}

/// Per-dispatch context handed to every tool.
pub struct ToolContext<'a> {
    pub workspace: &'a mut Workspace,
    pub github: &'a dyn GithubApi,
    pub task: &'a Task,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn spec(&self) -> ToolSpec;

    fn effect(&self) -> Effect;

    /// Executes the tool live, returning the text result shown to the model.
    async fn run(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError>;

    /// Re-applies only the reversible local effects of a recorded
    /// invocation. Input errors during replay mean the effect is already
    /// present in the base (a later commit carried it) and count as success.
    async fn replay(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<(), ToolError> {
        match self.effect() {
            Effect::Overlay => match self.run(args, ctx).await {
                Ok(_) => Ok(()),
                Err(ToolError::Input(reason)) => {
                    debug!(tool = self.name(), reason = %reason, "replay skipped input error");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Effect::ReadOnly | Effect::Commit | Effect::Remote => Ok(()),
        }
    }
}

/// Dispatches invocations by tool name. Iteration order (and therefore the
/// advertised schema order) is name-sorted and stable.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// The full tool set the agent offers the model.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TextEditorTool));
        registry.register(Box::new(DeleteFileTool));
        registry.register(Box::new(SearchInFileTool));
        registry.register(Box::new(ValidateChangesTool));
        registry.register(Box::new(PublishChangesTool));
        registry.register(Box::new(PostCommentTool));
        registry.register(Box::new(AddReactionTool));
        registry.register(Box::new(ReportLimitationTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// Live dispatch. An unknown tool name is a dispatch failure, which is
    /// fatal for the task: the model can only name tools it was offered.
    pub async fn run(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Fatal(format!("unknown tool: {name}")))?;
        tool.run(args, ctx).await
    }

    /// Replay dispatch during conversation resumption.
    pub async fn replay(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<(), ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Fatal(format!("unknown tool: {name}")))?;
        tool.replay(args, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Required string argument, as an input error when missing.
pub(crate) fn require_str<'a>(
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Input(format!("missing required argument: {key}")))
}

pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

//! Validate-changes tool: commits the overlay (if any) to the work branch
//! and runs CI validation on the resulting tip.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::llm::ToolSpec;
use crate::tools::{optional_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_VALIDATE_CHANGES: &str = "validate_changes";

pub struct ValidateChangesTool;

#[async_trait]
impl Tool for ValidateChangesTool {
    fn name(&self) -> &'static str {
        TOOL_VALIDATE_CHANGES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_VALIDATE_CHANGES.to_string(),
            description: "Commit any staged changes to the work branch and run the project's \
                          validation on the result. commit_message is required exactly when \
                          staged changes exist. Validation can take a long time."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "commit_message": {
                        "type": "string",
                        "description": "Commit message for the staged changes. Omit when \
                                        there is nothing staged."
                    }
                }
            }),
        }
    }

    fn effect(&self) -> Effect {
        Effect::Commit
    }

    async fn run(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let message = optional_str(&args, "commit_message");
        let outcome = ctx.workspace.validate_changes(message).await?;
        if outcome.succeeded {
            Ok(format!("Validation succeeded. {}", outcome.details))
        } else {
            Ok(format!("Validation FAILED. {}", outcome.details))
        }
    }

    /// The commit already happened and its result is recorded in the
    /// conversation. Replay only restores the post-commit local state:
    /// anything re-staged by earlier replayed edits is dropped, because the
    /// work-branch tip already contains it.
    async fn replay(
        &self,
        _args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<(), ToolError> {
        if ctx.workspace.has_local_changes() {
            debug!("replay of validate_changes clearing re-staged overlay");
            ctx.workspace.clear_local_changes();
        }
        Ok(())
    }
}

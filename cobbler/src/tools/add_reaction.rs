//! Add-reaction tool: the bot's persistent acknowledgment of a comment.
//!
//! A comment keeps requiring a response until the bot reacts to it, so every
//! handled comment must receive exactly one reaction.

use async_trait::async_trait;
use serde_json::json;

use crate::github::CommentScope;
use crate::llm::ToolSpec;
use crate::tools::{require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_ADD_REACTION: &str = "add_reaction";

const ALLOWED: &[&str] = &[
    "+1", "-1", "laugh", "confused", "heart", "hooray", "rocket", "eyes",
];

pub struct AddReactionTool;

#[async_trait]
impl Tool for AddReactionTool {
    fn name(&self) -> &'static str {
        TOOL_ADD_REACTION
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_ADD_REACTION.to_string(),
            description: "React to a comment. This is how you acknowledge a comment you have \
                          handled; unacknowledged comments keep demanding attention. scope \
                          'issue' is an issue/PR comment, 'review' a review comment."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "comment_id": {
                        "type": "integer",
                        "description": "Id of the comment to react to."
                    },
                    "scope": {
                        "type": "string",
                        "enum": ["issue", "review"],
                        "description": "Which comment namespace the id belongs to."
                    },
                    "reaction": {
                        "type": "string",
                        "enum": ALLOWED,
                        "description": "Reaction content."
                    }
                },
                "required": ["comment_id", "scope", "reaction"]
            }),
        }
    }

    fn effect(&self) -> Effect {
        Effect::Remote
    }

    async fn run(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let comment_id = args
            .get("comment_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ToolError::Input("missing required argument: comment_id".to_string()))?;
        let scope = match require_str(&args, "scope")? {
            "issue" => CommentScope::Issue,
            "review" => CommentScope::Review,
            other => return Err(ToolError::Input(format!("unknown scope: {other}"))),
        };
        let reaction = require_str(&args, "reaction")?;
        if !ALLOWED.contains(&reaction) {
            return Err(ToolError::Input(format!(
                "unknown reaction: {reaction} (allowed: {})",
                ALLOWED.join(", ")
            )));
        }
        let issue = &ctx.task.issue;
        ctx.github
            .create_comment_reaction(&issue.owner, &issue.repo, scope, comment_id, reaction)
            .await?;
        Ok(format!("Reacted with {reaction} to comment {comment_id}."))
    }
}

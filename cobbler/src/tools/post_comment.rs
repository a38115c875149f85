//! Post-comment tool: issue comments, PR comments, and review-thread replies.

use async_trait::async_trait;
use serde_json::json;

use crate::llm::ToolSpec;
use crate::tools::{optional_str, require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_POST_COMMENT: &str = "post_comment";

pub struct PostCommentTool;

#[async_trait]
impl Tool for PostCommentTool {
    fn name(&self) -> &'static str {
        TOOL_POST_COMMENT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_POST_COMMENT.to_string(),
            description: "Post a comment. target 'issue' comments on the issue, 'pr' comments \
                          on the pull request, 'review' replies to a review comment thread \
                          (in_reply_to is the id of the thread's comment)."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target": {
                        "type": "string",
                        "enum": ["issue", "pr", "review"],
                        "description": "Where to post."
                    },
                    "body": {
                        "type": "string",
                        "description": "Comment text (Markdown)."
                    },
                    "in_reply_to": {
                        "type": "integer",
                        "description": "For target 'review': the review comment id to reply to."
                    }
                },
                "required": ["target", "body"]
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
        let target = require_str(&args, "target")?;
        let body = require_str(&args, "body")?;
        let issue = &ctx.task.issue;
        match target {
            "issue" => {
                ctx.github
                    .create_issue_comment(&issue.owner, &issue.repo, issue.number, body)
                    .await?;
                Ok(format!("Commented on issue #{}.", issue.number))
            }
            "pr" => {
                let pull = ctx.task.pull.as_ref().ok_or_else(|| {
                    ToolError::Input("no pull request exists for this task yet".to_string())
                })?;
                ctx.github
                    .create_issue_comment(&issue.owner, &issue.repo, pull.number, body)
                    .await?;
                Ok(format!("Commented on pull request #{}.", pull.number))
            }
            "review" => {
                let pull = ctx.task.pull.as_ref().ok_or_else(|| {
                    ToolError::Input("no pull request exists for this task yet".to_string())
                })?;
                let in_reply_to = args
                    .get("in_reply_to")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        ToolError::Input(
                            "in_reply_to is required for target 'review'".to_string(),
                        )
                    })?;
                ctx.github
                    .create_review_reply(&issue.owner, &issue.repo, pull.number, in_reply_to, body)
                    .await?;
                Ok(format!("Replied to review comment {in_reply_to}."))
            }
            other => Err(ToolError::Input(format!("unknown target: {other}"))),
        }
    }
}

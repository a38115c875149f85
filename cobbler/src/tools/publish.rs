//! Publish-changes tool: merge the work branch into the review branch and
//! ensure the pull request exists.

use async_trait::async_trait;
use serde_json::json;

use crate::llm::ToolSpec;
use crate::tools::{require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_PUBLISH_CHANGES: &str = "publish_changes_for_review";

pub struct PublishChangesTool;

#[async_trait]
impl Tool for PublishChangesTool {
    fn name(&self) -> &'static str {
        TOOL_PUBLISH_CHANGES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_PUBLISH_CHANGES.to_string(),
            description: "Publish validated changes for human review: merges the work branch \
                          into the review branch and opens the pull request if it does not \
                          exist yet. Fails if unvalidated staged changes exist. With an \
                          existing pull request the title and body are ignored."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Pull request title (used only on first publish)."
                    },
                    "body": {
                        "type": "string",
                        "description": "Pull request body; reference the issue it fixes."
                    }
                },
                "required": ["title", "body"]
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
        let title = require_str(&args, "title")?;
        let body = require_str(&args, "body")?;
        let pull = ctx
            .workspace
            .publish_changes_for_review(title, body)
            .await?;
        Ok(format!(
            "Published for review. Pull request #{}: {}",
            pull.number, pull.url
        ))
    }
}

//! Report-limitation tool: a structured "cannot do X" comment on the issue.

use async_trait::async_trait;
use serde_json::json;

use crate::llm::ToolSpec;
use crate::tools::{require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_REPORT_LIMITATION: &str = "report_limitation";

pub struct ReportLimitationTool;

#[async_trait]
impl Tool for ReportLimitationTool {
    fn name(&self) -> &'static str {
        TOOL_REPORT_LIMITATION
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_REPORT_LIMITATION.to_string(),
            description: "Report that part of the task is beyond what you can do (for \
                          example, it needs local execution or credentials you do not \
                          have). Posts a structured comment so a human can take over."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limitation": {
                        "type": "string",
                        "description": "What you cannot do, and why."
                    }
                },
                "required": ["limitation"]
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
        let limitation = require_str(&args, "limitation")?;
        let issue = &ctx.task.issue;
        let body = format!(
            "**Limitation**\n\nI cannot complete part of this task:\n\n> {}\n\n\
             A maintainer may need to take it from here.",
            limitation.replace('\n', "\n> ")
        );
        ctx.github
            .create_issue_comment(&issue.owner, &issue.repo, issue.number, &body)
            .await?;
        Ok("Limitation reported on the issue.".to_string())
    }
}

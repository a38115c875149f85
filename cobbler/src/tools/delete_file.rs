//! Delete-file tool: tombstones a path in the workspace overlay.

use async_trait::async_trait;
use serde_json::json;

use crate::llm::ToolSpec;
use crate::tools::{require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_DELETE_FILE: &str = "delete_file";

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &'static str {
        TOOL_DELETE_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_DELETE_FILE.to_string(),
            description: "Delete a file from the repository working tree. The deletion is \
                          staged locally; use validate_changes to commit it."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the repository root."
                    }
                },
                "required": ["path"]
            }),
        }
    }

    fn effect(&self) -> Effect {
        Effect::Overlay
    }

    async fn run(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let path = require_str(&args, "path")?;
        if !ctx.workspace.file_exists(path).await? {
            return Err(ToolError::Input(format!("file not found: {path}")));
        }
        ctx.workspace.delete(path);
        Ok(format!("Deleted {path}."))
    }
}

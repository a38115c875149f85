//! Search-in-file tool: regex search over one workspace file. Read-only.

use async_trait::async_trait;
use serde_json::json;

use crate::llm::ToolSpec;
use crate::tools::{require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_SEARCH_IN_FILE: &str = "search_in_file";

const MAX_MATCHES: usize = 100;

pub struct SearchInFileTool;

#[async_trait]
impl Tool for SearchInFileTool {
    fn name(&self) -> &'static str {
        TOOL_SEARCH_IN_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SEARCH_IN_FILE.to_string(),
            description: "Search one file for a regular expression and return the matching \
                          lines with their line numbers."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the repository root."
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression to search for."
                    }
                },
                "required": ["path", "pattern"]
            }),
        }
    }

    fn effect(&self) -> Effect {
        Effect::ReadOnly
    }

    async fn run(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let path = require_str(&args, "path")?;
        let pattern = require_str(&args, "pattern")?;
        let re = regex::Regex::new(pattern)
            .map_err(|e| ToolError::Input(format!("invalid pattern: {e}")))?;
        let content = ctx.workspace.read(path).await?;
        let mut out = String::new();
        let mut matches = 0usize;
        for (idx, line) in content.lines().enumerate() {
            if re.is_match(line) {
                matches += 1;
                if matches > MAX_MATCHES {
                    out.push_str("... (more matches elided)\n");
                    break;
                }
                out.push_str(&format!("{}: {}\n", idx + 1, line));
            }
        }
        if matches == 0 {
            return Ok(format!("no matches for `{pattern}` in {path}"));
        }
        Ok(out)
    }
}

//! Text-editor tool: `view`, `str_replace`, `create`, and `insert` over a
//! single workspace file. All mutations land in the overlay only.

use async_trait::async_trait;
use serde_json::json;

use crate::llm::ToolSpec;
use crate::tools::{optional_str, require_str, Effect, Tool, ToolContext, ToolError};

pub const TOOL_TEXT_EDITOR: &str = "text_editor";

const DESCRIPTION: &str = "\
View and edit files in the repository working tree.

Commands:
- view: show a file with line numbers, or list a directory. Optional \
view_range [start, end] limits the lines shown (1-based, inclusive).
- str_replace: replace old_str with new_str. old_str must match exactly one \
location in the file; include surrounding lines to disambiguate.
- create: create or overwrite a file with file_text.
- insert: insert new_str after line insert_line (0 inserts at the top).

Edits are staged locally; use validate_changes to commit and check them.";

pub struct TextEditorTool;

#[async_trait]
impl Tool for TextEditorTool {
    fn name(&self) -> &'static str {
        TOOL_TEXT_EDITOR
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_TEXT_EDITOR.to_string(),
            description: DESCRIPTION.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "enum": ["view", "str_replace", "create", "insert"],
                        "description": "The operation to perform."
                    },
                    "path": {
                        "type": "string",
                        "description": "Path relative to the repository root."
                    },
                    "view_range": {
                        "type": "array",
                        "items": { "type": "integer" },
                        "description": "For view: [start, end] lines, 1-based inclusive."
                    },
                    "old_str": {
                        "type": "string",
                        "description": "For str_replace: the exact text to replace."
                    },
                    "new_str": {
                        "type": "string",
                        "description": "For str_replace/insert: the replacement or inserted text."
                    },
                    "file_text": {
                        "type": "string",
                        "description": "For create: the full file content."
                    },
                    "insert_line": {
                        "type": "integer",
                        "description": "For insert: line number to insert after (0 = top)."
                    }
                },
                "required": ["command", "path"]
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
        let command = require_str(&args, "command")?;
        let path = require_str(&args, "path")?;
        match command {
            "view" => view(&args, path, ctx).await,
            "str_replace" => str_replace(&args, path, ctx).await,
            "create" => create(&args, path, ctx),
            "insert" => insert(&args, path, ctx).await,
            other => Err(ToolError::Input(format!("unknown command: {other}"))),
        }
    }

    async fn replay(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<(), ToolError> {
        if optional_str(&args, "command") == Some("view") {
            return Ok(());
        }
        match self.run(args, ctx).await {
            Ok(_) | Err(ToolError::Input(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn view(
    args: &serde_json::Value,
    path: &str,
    ctx: &mut ToolContext<'_>,
) -> Result<String, ToolError> {
    if ctx.workspace.is_dir(path).await? {
        let entries = ctx.workspace.list_dir(path).await?;
        if entries.is_empty() {
            return Ok(format!("{path} is an empty directory"));
        }
        return Ok(entries.join("\n"));
    }
    let content = ctx.workspace.read(path).await?;
    let range = args.get("view_range").and_then(|v| v.as_array());
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = match range {
        Some(range) => {
            let start = range.first().and_then(|v| v.as_u64()).unwrap_or(1).max(1) as usize;
            let end = range
                .get(1)
                .and_then(|v| v.as_u64())
                .map(|e| e as usize)
                .unwrap_or(lines.len())
                .min(lines.len());
            if start > lines.len() {
                return Err(ToolError::Input(format!(
                    "view_range starts at line {start} but {path} has {} lines",
                    lines.len()
                )));
            }
            (start, end)
        }
        None => (1, lines.len()),
    };
    let mut out = String::new();
    for (idx, line) in lines[start - 1..end].iter().enumerate() {
        out.push_str(&format!("{:>6}\t{}\n", start + idx, line));
    }
    Ok(out)
}

async fn str_replace(
    args: &serde_json::Value,
    path: &str,
    ctx: &mut ToolContext<'_>,
) -> Result<String, ToolError> {
    let old_str = require_str(args, "old_str")?;
    let new_str = optional_str(args, "new_str").unwrap_or("");
    let content = ctx.workspace.read(path).await?;
    let replaced = replace_unique(&content, old_str, new_str).map_err(ToolError::Input)?;
    ctx.workspace.write(path, replaced);
    Ok(format!("Replaced one occurrence in {path}."))
}

fn create(
    args: &serde_json::Value,
    path: &str,
    ctx: &mut ToolContext<'_>,
) -> Result<String, ToolError> {
    let file_text = require_str(args, "file_text")?;
    ctx.workspace.write(path, file_text);
    Ok(format!("Created {path}."))
}

async fn insert(
    args: &serde_json::Value,
    path: &str,
    ctx: &mut ToolContext<'_>,
) -> Result<String, ToolError> {
    let new_str = require_str(args, "new_str")?;
    let insert_line = args
        .get("insert_line")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ToolError::Input("missing required argument: insert_line".to_string()))?
        as usize;
    let content = ctx.workspace.read(path).await?;
    let mut lines: Vec<&str> = content.split('\n').collect();
    let trailing_newline = content.ends_with('\n');
    if trailing_newline {
        lines.pop();
    }
    if insert_line > lines.len() {
        return Err(ToolError::Input(format!(
            "insert_line {insert_line} is past the end of {path} ({} lines)",
            lines.len()
        )));
    }
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend(&lines[..insert_line]);
    out.extend(new_str.split('\n'));
    out.extend(&lines[insert_line..]);
    let mut joined = out.join("\n");
    if trailing_newline {
        joined.push('\n');
    }
    ctx.workspace.write(path, joined);
    Ok(format!("Inserted after line {insert_line} in {path}."))
}

/// Replaces `old_str` with `new_str` when it occurs exactly once.
///
/// # Errors
///
/// - `"old_str not found in file"` – zero occurrences.
/// - `"old_str found N times in file, must be unique"` – more than one.
pub fn replace_unique(content: &str, old_str: &str, new_str: &str) -> Result<String, String> {
    if old_str.is_empty() {
        return Err("old_str must not be empty".to_string());
    }
    let count = content.matches(old_str).count();
    match count {
        0 => Err("old_str not found in file".to_string()),
        1 => Ok(content.replacen(old_str, new_str, 1)),
        n => Err(format!("old_str found {n} times in file, must be unique")),
    }
}

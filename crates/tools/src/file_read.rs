//! File read tool — read file contents with basic path hygiene.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use miniagent_core::error::ToolError;
use miniagent_core::tool::{Tool, ToolResult};

/// Paths under these prefixes are never readable through the tool.
const FORBIDDEN_PREFIXES: &[&str] = &["/etc/shadow", "/etc/passwd", "/proc", "/sys"];

const DESCRIPTION: &str = "\
Read the contents of a text file at the given path.

Use this tool when the user refers to a local file. Do not use it for web \
content (use web_search) or for directories.";

pub struct FileReadTool;

impl FileReadTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_path(tool_name: &str, path: &str) -> Result<(), ToolError> {
    if path.contains("..") {
        return Err(ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: "path traversal ('..') is not allowed".into(),
        });
    }
    if FORBIDDEN_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Err(ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: format!("access to '{path}' is not allowed"),
        });
    }
    Ok(())
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::BadArguments("Missing 'path' argument".into()))?;

        check_path("file_read", path)?;

        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(ToolResult {
                call_id: String::new(),
                output: content,
            }),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!("failed to read '{path}': {e}"),
            }),
        }
    }
}

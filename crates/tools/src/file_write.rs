//! File write tool — write text content to a file.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use miniagent_core::error::ToolError;
use miniagent_core::tool::{Tool, ToolResult};

use crate::file_read::check_path;

const DESCRIPTION: &str = "\
Write text content to a file at the given path, creating parent directories \
as needed. Overwrites any existing content.

Use this tool only when the user explicitly asks to save or create a file.";

pub struct FileWriteTool;

impl FileWriteTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
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
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
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
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::BadArguments("Missing 'content' argument".into()))?;

        check_path("file_write", path)?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed {
                        tool_name: "file_write".into(),
                        reason: format!("failed to create directories: {e}"),
                    })?;
            }
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_write".into(),
                reason: format!("failed to write '{path}': {e}"),
            })?;

        Ok(ToolResult {
            call_id: String::new(),
            output: format!("Wrote {} bytes to {path}", content.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let tool = FileWriteTool::new();
        let result = tool
            .execute(
                serde_json::json!({
                    "path": path.to_str().unwrap(),
                    "content": "saved text"
                }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.output.contains("10 bytes"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved text");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.txt");

        let tool = FileWriteTool::new();
        tool.execute(
            serde_json::json!({
                "path": path.to_str().unwrap(),
                "content": "x"
            }),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_content_rejected() {
        let tool = FileWriteTool::new();
        let err = tool
            .execute(
                serde_json::json!({ "path": "/tmp/x.txt" }),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadArguments(_)));
    }

    #[tokio::test]
    async fn traversal_blocked() {
        let tool = FileWriteTool::new();
        let err = tool
            .execute(
                serde_json::json!({ "path": "../evil.txt", "content": "x" }),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}

//! Tool trait and registry — the dispatch layer between the model and the world.
//!
//! Tools are what give the agent the ability to act: search the web, read and
//! write files, invoke skills. The registry validates model-emitted arguments
//! against each tool's JSON Schema before dispatch, and runs every handler
//! under a per-call timeout and the query's cancellation token.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Default per-call timeout when a tool does not override it.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Soft-limit category for tools with no specific category.
pub const CATEGORY_GENERAL: &str = "general";

/// A request to execute a tool.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The output content
    pub output: String,
}

/// The core Tool trait.
///
/// Each tool (web_search, file_read, file_write, skill) implements this
/// trait. Tools are registered in the ToolRegistry and made available to the
/// agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// Long-form description of what this tool does and when to use it.
    /// Injected verbatim into the system prompt.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Per-call timeout. Handlers that exceed it are abandoned.
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    /// Soft-limit category this tool counts against.
    fn limit_category(&self) -> &str {
        CATEGORY_GENERAL
    }

    /// Execute the tool with the given (already validated) arguments.
    ///
    /// Handlers should observe `cancel` at their own suspension points;
    /// the registry also races the whole call against it.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Immutable after startup: built once from environment capability and then
/// shared behind an `Arc`. The agent loop uses it to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up, validate, and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name so
    /// prompt construction is deterministic.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The soft-limit category of a tool, or `general` for unknown tools.
    pub fn category_of(&self, name: &str) -> &str {
        self.get(name)
            .map(|t| t.limit_category())
            .unwrap_or(CATEGORY_GENERAL)
    }

    /// Validate and execute a tool call under the per-tool timeout and the
    /// query's cancellation token.
    ///
    /// Validation failures never invoke the handler. Cancellation wins over
    /// timeout when both fire.
    pub async fn execute(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        validate_arguments(&call.name, &tool.parameters_schema(), &call.arguments)?;

        let limit = tool.timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolError::Cancelled(call.name.clone())),
            outcome = tokio::time::timeout(limit, tool.execute(call.arguments.clone(), cancel)) => {
                match outcome {
                    Ok(result) => result.map(|mut r| {
                        r.call_id = call.id.clone();
                        r
                    }),
                    Err(_) => Err(ToolError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_secs: limit.as_secs(),
                    }),
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate tool arguments against a JSON Schema (draft 2020-12).
fn validate_arguments(
    tool: &str,
    schema: &serde_json::Value,
    args: &serde_json::Value,
) -> std::result::Result<(), ToolError> {
    let compiled = jsonschema::draft202012::new(schema)
        .map_err(|e| ToolError::BadArguments(format!("invalid schema for '{tool}': {e}")))?;

    let errors: Vec<String> = compiled
        .iter_errors(args)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::BadArguments(errors.join("; ")))
    }
}

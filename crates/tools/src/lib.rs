//! Built-in tool implementations for miniagent.
//!
//! Tools give the agent the ability to act in the world: search the web,
//! read and write files, and pull skill instructions into its prompt.
//!
//! Registration is capability-driven: tools that need an external API key
//! register only when the key is present, so the model is never offered a
//! tool that cannot run.

pub mod file_read;
pub mod file_write;
pub mod skill;
pub mod web_search;

use std::sync::Arc;

use miniagent_core::tool::ToolRegistry;
use miniagent_skills::SkillSet;
use tracing::info;

/// Build the process-wide tool registry from environment capability.
///
/// - `file_read` / `file_write` — always available.
/// - `web_search` — only when a Tavily API key is configured.
/// - `skill` — only when at least one skill was discovered.
pub fn build_registry(tavily_api_key: Option<&str>, skills: Arc<SkillSet>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_read::FileReadTool::new()));
    registry.register(Box::new(file_write::FileWriteTool::new()));

    match tavily_api_key {
        Some(key) if !key.is_empty() => {
            registry.register(Box::new(web_search::WebSearchTool::new(key)));
        }
        _ => info!("TAVILY_API_KEY not set — web_search tool disabled"),
    }

    if !skills.is_empty() {
        registry.register(Box::new(skill::SkillTool::new(skills)));
    }

    registry
}

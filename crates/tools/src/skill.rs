//! Skill tool — injects a named skill's instructions into the model prompt.
//!
//! All discovered skills are exposed through this single tool; the `name`
//! argument selects which skill body the model receives as its observation.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use miniagent_core::error::ToolError;
use miniagent_core::tool::{Tool, ToolResult};
use miniagent_skills::SkillSet;

pub struct SkillTool {
    skills: Arc<SkillSet>,
    description: String,
}

impl SkillTool {
    pub fn new(skills: Arc<SkillSet>) -> Self {
        let description = format!(
            "Load the instructions of a named skill. The skill body tells you \
how to carry out a specialised task — follow it for the rest of the query.\n\n{}",
            skills.prompt_section()
        );
        Self {
            skills,
            description,
        }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        "skill"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The name of the skill to load"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let name = arguments["name"]
            .as_str()
            .ok_or_else(|| ToolError::BadArguments("Missing 'name' argument".into()))?;

        let skill = self.skills.get(name).ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: "skill".into(),
            reason: format!(
                "unknown skill '{name}' — available: {}",
                self.skills
                    .list()
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            output: format!("# Skill: {}\n\n{}", skill.name, skill.body),
        })
    }
}

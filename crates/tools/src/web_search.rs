//! Web search tool backed by the Tavily search API.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use miniagent_core::error::ToolError;
use miniagent_core::tool::{Tool, ToolResult};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

const DESCRIPTION: &str = "\
Search the web for current information. Returns a numbered list of results \
with titles, URLs, and content snippets.

Use this tool when the user asks about current events, prices, news, or any \
fact that may have changed since your training data. Do not use it for \
questions you can answer directly, for math, or for content of local files \
(use file_read for those).";

pub struct WebSearchTool {
    api_key: String,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn format_results(results: &[TavilyResult]) -> String {
        if results.is_empty() {
            return "No results found.".into();
        }
        let mut out = String::new();
        for (i, r) in results.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   {}\n   {}\n", i + 1, r.title, r.url, r.content));
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 5)",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["query"]
        })
    }

    fn limit_category(&self) -> &str {
        "search"
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::BadArguments("Missing 'query' argument".into()))?;
        let max_results = arguments["max_results"].as_u64().unwrap_or(5).min(10);

        debug!(query = %query, max_results, "Tavily search");

        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
        });

        let response = self
            .client
            .post(TAVILY_ENDPOINT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Tavily returned {status}: {detail}"),
            });
        }

        let parsed: TavilyResponse =
            response.json().await.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("unparseable response: {e}"),
            })?;

        Ok(ToolResult {
            call_id: String::new(),
            output: Self::format_results(&parsed.results),
        })
    }
}

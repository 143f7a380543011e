//! Agent-level streaming events.
//!
//! `AgentEvent` is the wire protocol between the loop and the UI: the SSE
//! endpoint serialises each event as one `data: <json>\n\n` frame. For one
//! query, events are totally ordered:
//!
//! `thinking? (tool_start (tool_end|tool_error))* tool_limit? …
//!  answer_start answer_chunk* done`

use serde::{Deserialize, Serialize};

/// One entry of the `done` event's tool-call recap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub tool: String,
    pub args: serde_json::Value,
}

/// Events emitted by the agent during a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Free-form model narration preceding tool use.
    Thinking { message: String },

    /// A tool invocation is starting.
    ToolStart {
        tool: String,
        args: serde_json::Value,
    },

    /// A tool finished; `result` is the rendered short form and may contain
    /// a context pointer.
    ToolEnd {
        tool: String,
        result: String,
        duration_ms: u64,
    },

    /// A tool failed; the loop continues. `error` is a short human-readable
    /// string, never a stack trace.
    ToolError {
        tool: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// A soft limit was crossed; advisory only.
    ToolLimit { reason: String },

    /// The final answer stream is starting.
    AnswerStart,

    /// One normalised answer token chunk.
    AnswerChunk { chunk: String },

    /// The query is complete. `answer` equals the concatenation of all
    /// `answer_chunk` values in order.
    Done {
        answer: String,
        iterations: usize,
        tool_calls: Vec<ToolCallSummary>,
    },
}

impl AgentEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::ToolError { .. } => "tool_error",
            Self::ToolLimit { .. } => "tool_limit",
            Self::AnswerStart => "answer_start",
            Self::AnswerChunk { .. } => "answer_chunk",
            Self::Done { .. } => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_thinking() {
        let event = AgentEvent::Thinking {
            message: "Looking this up".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"thinking""#));
        assert!(json.contains(r#""message":"Looking this up""#));
    }

    #[test]
    fn event_serialization_tool_start() {
        let event = AgentEvent::ToolStart {
            tool: "web_search".into(),
            args: serde_json::json!({"query": "AAPL"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_start""#));
        assert!(json.contains(r#""tool":"web_search""#));
        assert!(json.contains(r#""query":"AAPL""#));
    }

    #[test]
    fn event_serialization_tool_end() {
        let event = AgentEvent::ToolEnd {
            tool: "web_search".into(),
            result: "AAPL at 190".into(),
            duration_ms: 120,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""duration_ms":120"#));
    }

    #[test]
    fn tool_error_omits_missing_duration() {
        let event = AgentEvent::ToolError {
            tool: "x".into(),
            error: "timeout".into(),
            duration_ms: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("duration_ms"));
    }

    #[test]
    fn answer_start_is_bare() {
        let json = serde_json::to_string(&AgentEvent::AnswerStart).unwrap();
        assert_eq!(json, r#"{"type":"answer_start"}"#);
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentEvent::Done {
            answer: "42".into(),
            iterations: 2,
            tool_calls: vec![ToolCallSummary {
                tool: "web_search".into(),
                args: serde_json::json!({"query": "x"}),
            }],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""iterations":2"#));
        assert!(json.contains(r#""tool":"web_search""#));
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"answer_chunk","chunk":"hi"}"#;
        let event: AgentEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentEvent::AnswerChunk { chunk } => assert_eq!(chunk, "hi"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            AgentEvent::ToolLimit { reason: "x".into() }.event_type(),
            "tool_limit"
        );
        assert_eq!(AgentEvent::AnswerStart.event_type(), "answer_start");
        assert_eq!(
            AgentEvent::Done {
                answer: String::new(),
                iterations: 0,
                tool_calls: vec![]
            }
            .event_type(),
            "done"
        );
    }
}

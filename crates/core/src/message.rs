//! Message and session domain types.
//!
//! These are the core value objects that flow through the entire system:
//! a user sends a message → the agent loop processes it → the provider
//! generates a response → everything is appended to the session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for one ongoing conversation.
///
/// Clients supply an opaque string; we normalise it into a filesystem-safe
/// form so it can double as the session's on-disk file stem. Printable ASCII
/// word characters (plus `.`, `_`, `:`, `-`) survive unchanged; path
/// separators and whitespace become `-`; non-printing characters are
/// dropped. The result is bounded to 128 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

/// Maximum length of a normalised session key.
const MAX_KEY_LEN: usize = 128;

impl SessionKey {
    /// Normalise a client-supplied string into a session key.
    ///
    /// Empty (or fully stripped) input falls back to `"default"`.
    pub fn normalize(raw: &str) -> Self {
        let mut key = String::with_capacity(raw.len().min(MAX_KEY_LEN));
        for c in raw.chars() {
            if key.len() >= MAX_KEY_LEN {
                break;
            }
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-') {
                key.push(c);
            } else if c.is_control() {
                // non-printing: stripped entirely
            } else {
                // path separators, whitespace, and anything non-ASCII
                key.push('-');
            }
        }
        if key.is_empty() {
            key.push_str("default");
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, tool descriptions, memory block)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a session.
///
/// Assistant messages produced by the loop carry *either* final text *or* a
/// non-empty `tool_calls` list — never both for the same step. History may
/// interleave them as separate messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            timestamp: Utc::now(),
        }
    }
}

/// A tool call embedded in an assistant message.
///
/// `arguments` is the raw JSON string as the provider emitted it; it is only
/// parsed at the dispatch boundary so that history replay reconstructs the
/// exact same trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call (matches the provider's tool_call.id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// Per-session metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_safe_chars() {
        let key = SessionKey::normalize("agent:main.chat_01-x");
        assert_eq!(key.as_str(), "agent:main.chat_01-x");
    }

    #[test]
    fn normalize_replaces_path_separators() {
        let key = SessionKey::normalize("../etc/passwd");
        assert_eq!(key.as_str(), "..-etc-passwd");
        assert!(!key.as_str().contains('/'));
    }

    #[test]
    fn normalize_strips_control_chars() {
        let key = SessionKey::normalize("chat\u{0000}\u{0007}one");
        assert_eq!(key.as_str(), "chatone");
    }

    #[test]
    fn normalize_bounds_length() {
        let long = "x".repeat(500);
        let key = SessionKey::normalize(&long);
        assert_eq!(key.as_str().len(), 128);
    }

    #[test]
    fn normalize_empty_falls_back_to_default() {
        assert_eq!(SessionKey::normalize("").as_str(), "default");
        assert_eq!(SessionKey::normalize("\u{0001}\u{0002}").as_str(), "default");
    }

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "web_search".into(),
            arguments: r#"{"query":"AAPL"}"#.into(),
        }];
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "web_search");
    }

    #[test]
    fn empty_tool_calls_omitted_from_json() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }
}

//! Scratchpad — the per-query record of thoughts, acts, and observations.
//!
//! Append-only; lifetime is one call to the loop. Rendered output seeds each
//! subsequent model call, so rendering must be deterministic: same steps,
//! same bytes. Observations hold the pointer-inlined short form of bulky
//! tool outputs, never the raw result.

use serde_json::Value;

/// One step of a query's execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Free-form model narration extracted before tool use.
    Thought { text: String },

    /// A tool invocation the model requested.
    Act {
        tool: String,
        arguments: Value,
        call_id: String,
        category: String,
    },

    /// The outcome of the matching `Act`.
    Observe {
        call_id: String,
        ok: bool,
        text: String,
        duration_ms: u64,
    },

    /// A soft-limit warning injected into the next prompt.
    LimitNotice { reason: String },
}

/// Append-only in-memory record of one query's iterations.
#[derive(Debug, Default)]
pub struct Scratchpad {
    steps: Vec<Step>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thought(&mut self, text: &str) {
        self.steps.push(Step::Thought {
            text: text.to_string(),
        });
    }

    pub fn act(&mut self, tool: &str, arguments: &Value, call_id: &str, category: &str) {
        self.steps.push(Step::Act {
            tool: tool.to_string(),
            arguments: arguments.clone(),
            call_id: call_id.to_string(),
            category: category.to_string(),
        });
    }

    pub fn observe(&mut self, call_id: &str, ok: bool, text: &str, duration_ms: u64) {
        self.steps.push(Step::Observe {
            call_id: call_id.to_string(),
            ok,
            text: text.to_string(),
            duration_ms,
        });
    }

    pub fn limit_notice(&mut self, reason: &str) {
        self.steps.push(Step::LimitNotice {
            reason: reason.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total number of `Act` steps.
    pub fn act_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Act { .. }))
            .count()
    }

    /// Number of `Act` steps in a soft-limit category.
    pub fn count_category(&self, category: &str) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Act { category: c, .. } if c == category))
            .count()
    }

    /// Whether the most recent `Act` is still waiting for its `Observe`.
    /// The loop never issues a new model call while this holds.
    pub fn has_dangling_act(&self) -> bool {
        let mut open: Option<&str> = None;
        for step in &self.steps {
            match step {
                Step::Act { call_id, .. } => open = Some(call_id),
                Step::Observe { call_id, .. } => {
                    if open == Some(call_id.as_str()) {
                        open = None;
                    }
                }
                _ => {}
            }
        }
        open.is_some()
    }

    /// Format the scratchpad into a prompt fragment, chronologically.
    ///
    /// Durations are deliberately excluded so that replaying a persisted
    /// session reproduces the same bytes.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            match step {
                Step::Thought { text } => {
                    out.push_str("Thought: ");
                    out.push_str(text);
                }
                Step::Act {
                    tool,
                    arguments,
                    call_id,
                    ..
                } => {
                    out.push_str(&format!("Action[{call_id}]: {tool} {arguments}"));
                }
                Step::Observe {
                    call_id, ok, text, ..
                } => {
                    let marker = if *ok { "" } else { " (error)" };
                    out.push_str(&format!("Observation[{call_id}]{marker}: {text}"));
                }
                Step::LimitNotice { reason } => {
                    out.push_str("Notice: ");
                    out.push_str(reason);
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Scratchpad {
        let mut pad = Scratchpad::new();
        pad.thought("Need the current price");
        pad.act(
            "web_search",
            &serde_json::json!({"query": "AAPL"}),
            "call_1",
            "search",
        );
        pad.observe("call_1", true, "AAPL at 190", 42);
        pad
    }

    #[test]
    fn render_is_chronological() {
        let rendered = sample().render();
        let thought = rendered.find("Thought:").unwrap();
        let action = rendered.find("Action[call_1]").unwrap();
        let obs = rendered.find("Observation[call_1]").unwrap();
        assert!(thought < action && action < obs);
    }

    #[test]
    fn render_is_deterministic() {
        assert_eq!(sample().render(), sample().render());
    }

    #[test]
    fn render_excludes_duration() {
        let rendered = sample().render();
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn render_marks_errors() {
        let mut pad = Scratchpad::new();
        pad.act("web_search", &serde_json::json!({}), "call_1", "search");
        pad.observe("call_1", false, "timeout", 60_000);
        assert!(pad.render().contains("Observation[call_1] (error): timeout"));
    }

    #[test]
    fn category_counting() {
        let mut pad = sample();
        pad.act("file_read", &serde_json::json!({}), "call_2", "general");
        pad.observe("call_2", true, "ok", 1);
        assert_eq!(pad.count_category("search"), 1);
        assert_eq!(pad.count_category("general"), 1);
        assert_eq!(pad.act_count(), 2);
    }

    #[test]
    fn dangling_act_detection() {
        let mut pad = Scratchpad::new();
        assert!(!pad.has_dangling_act());
        pad.act("web_search", &serde_json::json!({}), "call_1", "search");
        assert!(pad.has_dangling_act());
        pad.observe("call_1", true, "done", 5);
        assert!(!pad.has_dangling_act());
    }

    #[test]
    fn limit_notice_rendered() {
        let mut pad = Scratchpad::new();
        pad.limit_notice("You have used 4 searches; wrap up.");
        assert!(pad.render().contains("Notice: You have used 4 searches"));
    }

    #[test]
    fn empty_pad_renders_empty() {
        assert!(Scratchpad::new().render().is_empty());
        assert!(Scratchpad::new().is_empty());
    }
}

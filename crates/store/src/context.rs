//! Tool context store — content-addressed persistence for bulky tool outputs.
//!
//! Tool results can be large (a page snapshot, a file blob). Re-inlining them
//! into every subsequent prompt inflates token cost quadratically over the
//! loop, so the full result is written here once and the prompt carries only
//! a short head plus an opaque pointer. A later step can re-fetch the full
//! text by pointer.
//!
//! Pointers look like `ctx-3f2a…` — a short prefix over a 128-bit random id,
//! distinguishable in prose. Entries are immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use miniagent_core::error::StoreError;

/// Prefix that makes pointers recognisable inside prompt text.
const POINTER_PREFIX: &str = "ctx-";

/// A stored tool output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub pointer: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub full_result_text: String,
    pub created_at: DateTime<Utc>,
}

/// File-backed context store. Sole writer and reader of pointer blobs.
pub struct ToolContextStore {
    dir: PathBuf,
}

impl ToolContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into().join("context"),
        }
    }

    fn blob_path(&self, pointer: &str) -> PathBuf {
        self.dir.join(format!("{pointer}.json"))
    }

    /// Persist a full tool output and return its pointer.
    pub fn put(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
        full_result_text: &str,
    ) -> Result<String, StoreError> {
        std::fs::create_dir_all(&self.dir)?;

        let pointer = format!("{POINTER_PREFIX}{}", Uuid::new_v4().simple());
        let entry = ContextEntry {
            pointer: pointer.clone(),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            full_result_text: full_result_text.to_string(),
            created_at: Utc::now(),
        };

        let raw = serde_json::to_string(&entry)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(self.blob_path(&pointer), raw)?;

        debug!(
            pointer = %pointer,
            tool = %tool_name,
            bytes = full_result_text.len(),
            "Stored tool context"
        );
        Ok(pointer)
    }

    /// Fetch a stored entry by pointer.
    pub fn get(&self, pointer: &str) -> Result<ContextEntry, StoreError> {
        let raw = std::fs::read_to_string(self.blob_path(pointer))
            .map_err(|_| StoreError::NotFound(format!("context pointer '{pointer}'")))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Render a stored result for prompt inclusion: the full text if it fits
    /// within `max_inline_chars`, a head plus pointer placeholder otherwise.
    pub fn render(&self, pointer: &str, max_inline_chars: usize) -> Result<String, StoreError> {
        let entry = self.get(pointer)?;
        Ok(Self::render_inline(
            &entry.full_result_text,
            pointer,
            max_inline_chars,
        ))
    }

    /// Pure rendering helper for callers that already hold the full text
    /// (the loop renders right after `put` without a read-back).
    pub fn render_inline(text: &str, pointer: &str, max_inline_chars: usize) -> String {
        if text.chars().count() <= max_inline_chars {
            return text.to_string();
        }
        let head: String = text.chars().take(max_inline_chars).collect();
        format!(
            "{head}\n… [truncated — full output ({} chars) stored as {pointer}]",
            text.chars().count()
        )
    }
}

//! Memory index — persistent question/answer summaries with
//! keyword-overlap × recency-decay recall.
//!
//! One JSONL file per session under `memory/<key>.jsonl`; each line is a
//! JSON-encoded [`MemoryEntry`]. Recall tokenises the query into lower-cased
//! alphanumeric terms (minus a small stopword list), scores every entry in
//! the same session as `overlap × exp(-age_days / half_life)`, and returns
//! the top-k with ties broken by recency.
//!
//! Writes go through a single writer lock; reads take a snapshot of the
//! file without locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use miniagent_core::error::MemoryError;
use miniagent_core::message::SessionKey;

/// Recency half-life in days: an entry this old scores half as much as a
/// fresh one with the same keyword overlap.
const HALF_LIFE_DAYS: f64 = 7.0;

/// Default number of entries returned by recall.
pub const DEFAULT_RECALL_K: usize = 3;

/// Terms ignored during tokenisation.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "be", "by", "for", "from", "how", "in", "is", "it", "me", "my",
    "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

/// A single remembered question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub session_key: String,
    pub question: String,
    pub answer_summary: String,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// File-backed per-session memory index.
pub struct MemoryIndex {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl MemoryIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into().join("memory"),
            write_lock: Mutex::new(()),
        }
    }

    fn file_path(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{key}.jsonl"))
    }

    /// Record one exchange. Keywords are extracted from both the question
    /// and the answer summary.
    pub async fn record(
        &self,
        key: &SessionKey,
        question: &str,
        answer_summary: &str,
    ) -> Result<String, MemoryError> {
        let mut keywords = tokenize(question);
        for token in tokenize(answer_summary) {
            if !keywords.contains(&token) {
                keywords.push(token);
            }
        }

        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            session_key: key.as_str().to_string(),
            question: question.to_string(),
            answer_summary: answer_summary.to_string(),
            keywords,
            created_at: Utc::now(),
        };

        let _guard = self.write_lock.lock().await;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| MemoryError::Storage(format!("create memory dir: {e}")))?;

        let line = serde_json::to_string(&entry)
            .map_err(|e| MemoryError::Storage(format!("serialize memory entry: {e}")))?;
        let path = self.file_path(key);
        let mut content = std::fs::read_to_string(&path).unwrap_or_default();
        content.push_str(&line);
        content.push('\n');
        std::fs::write(&path, content)
            .map_err(|e| MemoryError::Storage(format!("write memory file: {e}")))?;

        debug!(session = %key, id = %entry.id, "Recorded memory");
        Ok(entry.id)
    }

    /// Recall the k most relevant recent entries for a query.
    ///
    /// Entries with zero keyword overlap never surface, however recent.
    pub fn recall(&self, key: &SessionKey, query: &str, k: usize) -> Vec<MemoryEntry> {
        let entries = self.load(key);
        if entries.is_empty() {
            return Vec::new();
        }

        let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let mut scored: Vec<(f64, MemoryEntry)> = entries
            .into_iter()
            .filter_map(|entry| {
                let overlap = entry
                    .keywords
                    .iter()
                    .filter(|kw| query_tokens.contains(kw.as_str()))
                    .count();
                if overlap == 0 {
                    return None;
                }
                let age_days = (now - entry.created_at).num_seconds().max(0) as f64 / 86_400.0;
                let score = overlap as f64 * (-age_days / HALF_LIFE_DAYS).exp();
                Some((score, entry))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        scored.truncate(k);
        scored.into_iter().map(|(_, e)| e).collect()
    }

    /// Snapshot all entries for a session. Corrupted lines are skipped.
    fn load(&self, key: &SessionKey) -> Vec<MemoryEntry> {
        let content = match std::fs::read_to_string(self.file_path(key)) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(session = %key, error = %e, "Skipping corrupted memory entry");
                    None
                }
            })
            .collect()
    }
}

/// Lower-cased alphanumeric terms, stopwords removed, order preserved,
/// duplicates dropped.
fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        let token = raw.to_lowercase();
        if STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}

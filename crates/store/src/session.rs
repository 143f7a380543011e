//! Append-only session store — persistent JSON-lines message logs.
//!
//! Each session is one JSONL file (one JSON-encoded `Message` per line)
//! plus a small metadata document. Writes hold a per-session lock so that
//! concurrent queries against the same key serialise; reads tolerate a
//! crash-truncated tail by skipping lines that fail to parse.
//!
//! Storage layout under the root:
//! - `sessions/<key>.jsonl`
//! - `session_metadata/<key>.json`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use miniagent_core::error::StoreError;
use miniagent_core::message::{Message, Role, SessionKey, SessionMeta};

/// Display names derived from the first user message are cut at this length.
const DISPLAY_NAME_MAX_CHARS: usize = 40;

/// A session summary returned by [`SessionStore::list_sessions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub key: String,
    pub name: String,
    pub updated_at: chrono::DateTime<Utc>,
}

/// File-backed session store. Exclusive owner of the session files under
/// its root directory.
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn log_path(&self, key: &SessionKey) -> PathBuf {
        self.root.join("sessions").join(format!("{key}.jsonl"))
    }

    fn meta_path(&self, key: &SessionKey) -> PathBuf {
        self.root
            .join("session_metadata")
            .join(format!("{key}.json"))
    }

    /// One lock per session key — single writer per key.
    async fn lock_for(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Durably append one message to a session's log and refresh metadata.
    pub async fn append(&self, key: &SessionKey, message: &Message) -> Result<(), StoreError> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let path = self.log_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(message)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;

        self.touch_metadata(key, message)?;
        debug!(session = %key, role = ?message.role, "Appended message");
        Ok(())
    }

    /// Create or refresh the metadata document for a session.
    fn touch_metadata(&self, key: &SessionKey, message: &Message) -> Result<(), StoreError> {
        let path = self.meta_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let now = Utc::now();
        let mut meta = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<SessionMeta>(&raw).unwrap_or_else(|e| {
                warn!(session = %key, error = %e, "Rebuilding corrupted session metadata");
                SessionMeta {
                    display_name: key.as_str().to_string(),
                    created_at: now,
                    updated_at: now,
                }
            }),
            Err(_) => {
                // First write for this session: derive the display name from
                // the first user message when we have one.
                let display_name = if message.role == Role::User {
                    truncate_chars(&message.content, DISPLAY_NAME_MAX_CHARS)
                } else {
                    key.as_str().to_string()
                };
                SessionMeta {
                    display_name,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        meta.updated_at = now;

        let raw = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(&path, raw)?;
        Ok(())
    }

    /// Load all messages for a session in insertion order.
    ///
    /// A missing log is an empty session, not an error. Unparseable lines
    /// (crash mid-write) are skipped.
    pub async fn load(&self, key: &SessionKey) -> Result<Vec<Message>, StoreError> {
        let path = self.log_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let messages = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Message>(line) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(session = %key, error = %e, "Skipping corrupted session line");
                    None
                }
            })
            .collect();
        Ok(messages)
    }

    /// List all sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, StoreError> {
        let dir = self.root.join("session_metadata");
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<SessionMeta>(&raw).ok())
            {
                Some(meta) => sessions.push(SessionInfo {
                    key: key.to_string(),
                    name: meta.display_name,
                    updated_at: meta.updated_at,
                }),
                None => warn!(session = %key, "Skipping unreadable session metadata"),
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Rename a session's display name.
    pub async fn rename(&self, key: &SessionKey, new_name: &str) -> Result<(), StoreError> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let path = self.meta_path(key);
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| StoreError::NotFound(format!("session '{key}'")))?;
        let mut meta: SessionMeta = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        meta.display_name = new_name.to_string();

        let raw = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(&path, raw)?;
        Ok(())
    }

    /// Delete a session's log and metadata.
    ///
    /// Context blobs referenced by the session are left in place; see the
    /// design notes on pointer GC.
    pub async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let log = self.log_path(key);
        let meta = self.meta_path(key);
        let had_log = log.exists();
        let had_meta = meta.exists();
        if !had_log && !had_meta {
            return Err(StoreError::NotFound(format!("session '{key}'")));
        }
        if had_log {
            std::fs::remove_file(&log)?;
        }
        if had_meta {
            std::fs::remove_file(&meta)?;
        }
        Ok(())
    }
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

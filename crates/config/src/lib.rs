//! Configuration loading for miniagent.
//!
//! Everything comes from the environment, read once at startup into an
//! [`AppConfig`]. `OPENAI_API_KEY` is the only required variable; the rest
//! have sensible defaults:
//!
//! | Variable | Default |
//! |---|---|
//! | `OPENAI_API_KEY` | (required) |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `OPENAI_MODEL` | `gpt-4o-mini` |
//! | `TAVILY_API_KEY` | unset — web search disabled |
//! | `MINIAGENT_HOST` | `127.0.0.1` |
//! | `MINIAGENT_PORT` | `8000` |
//! | `MINIAGENT_STORAGE_ROOT` | `.mini-agent` |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use miniagent_core::error::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_STORAGE_ROOT: &str = ".mini-agent";

/// The process configuration, read once at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub tavily_api_key: Option<String>,
    pub host: String,
    pub port: u16,
    pub storage_root: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_api_key", &"[REDACTED]")
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field(
                "tavily_api_key",
                &self.tavily_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_root", &self.storage_root)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration from an arbitrary lookup — testable without
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config {
                message: "OPENAI_API_KEY is required".into(),
            })?;

        let port = match lookup("MINIAGENT_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| Error::Config {
                message: format!("MINIAGENT_PORT is not a valid port: '{raw}'"),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            openai_api_key,
            openai_base_url: lookup("OPENAI_BASE_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            model: lookup("OPENAI_MODEL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.into()),
            tavily_api_key: lookup("TAVILY_API_KEY").filter(|v| !v.is_empty()),
            host: lookup("MINIAGENT_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.into()),
            port,
            storage_root: lookup("MINIAGENT_STORAGE_ROOT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
        })
    }
}

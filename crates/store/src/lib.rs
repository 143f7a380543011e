//! Persistence substrate for miniagent.
//!
//! Two stores, each the exclusive owner of its on-disk files:
//!
//! - [`SessionStore`] — append-only per-session message log (JSONL) with a
//!   small metadata document per session.
//! - [`ToolContextStore`] — content-addressed blobs of full tool outputs,
//!   addressed by opaque pointers that prompts can reference instead of
//!   inlining the whole result.
//!
//! Both use JSONL/JSON files under a shared storage root (default
//! `.mini-agent/`), human-inspectable and requiring zero external services.

pub mod context;
pub mod session;

pub use context::{ContextEntry, ToolContextStore};
pub use session::{SessionInfo, SessionStore};

//! The core agent loop — the heart of miniagent.
//!
//! One query flows through three phases:
//!
//! 1. **Setup** — load session history, recall memories, build the base
//!    prompt, persist the user message.
//! 2. **Reason/act loop** — ask the model what to do next; execute the tools
//!    it picks, feeding rendered results back via the scratchpad; stop when
//!    the model answers in text or the iteration cap is reached.
//! 3. **Answer** — stream the final answer token by token, persist it, and
//!    record a memory summary.
//!
//! Every phase narrates itself through [`AgentEvent`]s on a bounded channel,
//! and observes one cancellation token threaded in from the HTTP handler.

pub mod loop_runner;
pub mod scratchpad;
pub mod stream_event;

/// Scripted provider mocks for tests. Not part of the production surface —
/// only compiled for this crate's own tests or under the `test-util`
/// feature (enabled by dependents as a dev-dependency feature).
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use loop_runner::{AgentLoop, LoopConfig};
pub use scratchpad::{Scratchpad, Step};
pub use stream_event::{AgentEvent, ToolCallSummary};

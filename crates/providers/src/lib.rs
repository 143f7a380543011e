//! LLM provider adapters.
//!
//! One production adapter lives here: [`OpenAiProvider`], which speaks the
//! OpenAI-compatible `/chat/completions` wire format used by OpenAI proper,
//! OpenRouter, Ollama, vLLM, and most hosted gateways. The agent loop only
//! ever sees the `miniagent_core::Provider` trait.

pub mod openai;

pub use openai::OpenAiProvider;

//! Shared test helpers: a scripted mock provider.
//!
//! Used by the loop tests here and by the gateway's handler tests. Compiled
//! only under `cfg(test)` or the `test-util` feature — never part of a
//! production build.

use std::collections::VecDeque;
use std::sync::Mutex;

use miniagent_core::error::ProviderError;
use miniagent_core::message::{Message, MessageToolCall};
use miniagent_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` (including the default single-chunk `stream`
/// fallback) consumes the next response in the queue. Panics if more calls
/// are made than responses provided — a scripting error in the test.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    call_count: Mutex<usize>,
    stream_chunks: Option<Vec<String>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            call_count: Mutex::new(0),
            stream_chunks: None,
        }
    }

    pub fn from_ok(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Make `stream()` emit these chunks (then a done chunk) instead of
    /// consuming a scripted response.
    pub fn with_stream_chunks(mut self, chunks: Vec<&str>) -> Self {
        self.stream_chunks = Some(chunks.into_iter().map(String::from).collect());
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequentialMockProvider: script exhausted")
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        if let Some(chunks) = &self.stream_chunks {
            let (tx, rx) = tokio::sync::mpsc::channel(chunks.len() + 1);
            for chunk in chunks {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(chunk.clone()),
                        done: false,
                        usage: None,
                    }))
                    .await;
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: None,
                }))
                .await;
            return Ok(rx);
        }

        // No chunk script: wrap the next complete() response as one chunk.
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: None,
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call with JSON-encoded arguments.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

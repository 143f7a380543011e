//! The reason/act loop implementation.
//!
//! Control flow per query, matching the streaming event protocol:
//!
//! 1. **Setup** — normalise the session key, load history, recall memories,
//!    build the base prompt, persist the user message.
//! 2. **Loop** (bounded by `max_iterations`) — `complete()` with tools; a
//!    text-only response breaks to the answer phase. Tool calls run
//!    sequentially: each emits `tool_start`, executes under timeout and the
//!    query's cancellation token, stores its full output in the context
//!    store, and feeds the rendered short form back through the scratchpad.
//!    Failures emit `tool_error` and the loop continues — the model sees the
//!    error text and can pick another strategy. Soft limits only ever inject
//!    a prompt notice; the iteration cap is the one hard stop.
//! 3. **Answer** — `stream()` without tools, one `answer_chunk` per
//!    normalised chunk, then `done`, persistence, and a memory summary.
//!
//! Cancellation: after the token fires, no further events are emitted and
//! no assistant message is persisted; the scratchpad is simply dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use miniagent_core::message::{Message, SessionKey};
use miniagent_core::provider::{Provider, ProviderRequest};
use miniagent_core::tool::{ToolCall, ToolRegistry};
use miniagent_core::ToolError;
use miniagent_memory::MemoryIndex;
use miniagent_store::{SessionStore, ToolContextStore};

use crate::scratchpad::Scratchpad;
use crate::stream_event::{AgentEvent, ToolCallSummary};

/// Event channel capacity — bounded so a stalled HTTP client applies
/// backpressure to the loop instead of buffering unboundedly.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Question/answer prefix length recorded to the memory index.
const MEMORY_SUMMARY_CHARS: usize = 200;

/// Answer used when the provider fails on a reasoning round.
const APOLOGY: &str = "I ran into a problem while reasoning about your request \
and could not finish. Please try again in a moment.";

/// Tunable knobs for the loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    /// Hard cap on reasoning iterations.
    pub max_iterations: usize,
    /// Soft limit for the "search" category.
    pub search_soft_limit: usize,
    /// Soft limit across all tool calls.
    pub overall_soft_limit: usize,
    /// Budget for inlining tool output into prompts and events.
    pub max_inline_chars: usize,
    /// How many memories to recall per query.
    pub recall_limit: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            system_prompt: "You are a helpful assistant. Use the available tools \
when a question needs current or external information; answer directly when it \
does not."
                .into(),
            max_iterations: 8,
            search_soft_limit: 4,
            overall_soft_limit: 8,
            max_inline_chars: 2048,
            recall_limit: 3,
        }
    }
}

/// The agent loop. Cheap to clone — all heavy state is shared.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    context: Arc<ToolContextStore>,
    memory: Arc<MemoryIndex>,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        context: Arc<ToolContextStore>,
        memory: Arc<MemoryIndex>,
        config: LoopConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            sessions,
            context,
            memory,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one query. Returns a receiver of ordered [`AgentEvent`]s; the
    /// loop itself runs on a spawned task and observes `cancel`.
    pub fn run_stream(
        &self,
        query: &str,
        session_key: &str,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let this = self.clone();
        let query = query.to_string();
        let key = SessionKey::normalize(session_key);

        tokio::spawn(async move {
            this.drive(query, key, cancel, tx).await;
        });

        rx
    }

    /// The system prompt: identity, verbatim tool descriptions, and the
    /// recalled-memory block.
    fn build_system_prompt(&self, memories: &[miniagent_memory::MemoryEntry]) -> String {
        let mut prompt = self.config.system_prompt.clone();

        let defs = self.tools.definitions();
        if !defs.is_empty() {
            prompt.push_str("\n\n# Tools\n");
            for def in &defs {
                prompt.push_str(&format!("\n## {}\n{}\n", def.name, def.description));
            }
        }

        if !memories.is_empty() {
            prompt.push_str("\n\n# Relevant memories\n");
            for mem in memories {
                prompt.push_str(&format!(
                    "- Q: {} → A: {}\n",
                    mem.question, mem.answer_summary
                ));
            }
        }

        prompt
    }

    async fn drive(
        self,
        query: String,
        key: SessionKey,
        cancel: CancellationToken,
        tx: mpsc::Sender<AgentEvent>,
    ) {
        // ── Phase 1: Setup ──
        let history = match self.sessions.load(&key).await {
            Ok(h) => h,
            Err(e) => {
                warn!(session = %key, error = %e, "Failed to load session history");
                Vec::new()
            }
        };

        let recalled = self
            .memory
            .recall(&key, &query, self.config.recall_limit);
        let system_prompt = self.build_system_prompt(&recalled);

        let mut base = Vec::with_capacity(history.len() + 2);
        base.push(Message::system(system_prompt));
        base.extend(history);
        base.push(Message::user(&query));

        if let Err(e) = self.sessions.append(&key, &Message::user(&query)).await {
            warn!(session = %key, error = %e, "Failed to persist user message");
        }

        info!(session = %key, model = %self.config.model, "Query started");

        let tool_defs = self.tools.definitions();
        let mut pad = Scratchpad::new();
        let mut iterations = 0usize;
        let mut summaries: Vec<ToolCallSummary> = Vec::new();
        let mut warned_categories: HashSet<String> = HashSet::new();
        let mut finished_naturally = false;

        // ── Phase 2: Reason/act loop ──
        while iterations < self.config.max_iterations {
            iterations += 1;
            if cancel.is_cancelled() {
                debug!(session = %key, "Cancelled before reasoning round");
                return;
            }

            let mut messages = base.clone();
            if !pad.is_empty() {
                messages.push(Message::user(format!("## Work so far\n\n{}", pad.render())));
            }

            let request = ProviderRequest {
                model: self.config.model.clone(),
                messages,
                temperature: self.config.temperature,
                max_tokens: None,
                tools: tool_defs.clone(),
            };

            debug_assert!(
                !pad.has_dangling_act(),
                "reasoning round issued with an unobserved act"
            );
            let response = tokio::select! {
                _ = cancel.cancelled() => return,
                r = self.provider.complete(request) => r,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(session = %key, error = %e, "Provider failed on reasoning round");
                    let _ = tx
                        .send(AgentEvent::Done {
                            answer: APOLOGY.into(),
                            iterations,
                            tool_calls: summaries,
                        })
                        .await;
                    let _ = self
                        .sessions
                        .append(&key, &Message::assistant(APOLOGY))
                        .await;
                    return;
                }
            };

            if response.message.tool_calls.is_empty() {
                // Final text response — proceed to the streamed answer.
                finished_naturally = true;
                break;
            }

            let thinking = response.message.content.trim().to_string();
            if !thinking.is_empty() {
                pad.thought(&thinking);
                if tx
                    .send(AgentEvent::Thinking {
                        message: thinking.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }

            let tool_calls = response.message.tool_calls.clone();
            debug!(session = %key, count = tool_calls.len(), "Executing tool calls");

            // Tool calls of one round run sequentially so the scratchpad
            // stays linear and the prompt replay deterministic.
            let mut batch_messages: Vec<Message> = Vec::with_capacity(tool_calls.len());
            for tc in &tool_calls {
                if cancel.is_cancelled() {
                    return;
                }

                let args: serde_json::Value =
                    serde_json::from_str(&tc.arguments).unwrap_or_default();

                if tx
                    .send(AgentEvent::ToolStart {
                        tool: tc.name.clone(),
                        args: args.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                let category = self.tools.category_of(&tc.name).to_string();
                pad.act(&tc.name, &args, &tc.id, &category);
                summaries.push(ToolCallSummary {
                    tool: tc.name.clone(),
                    args: args.clone(),
                });

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: args.clone(),
                };

                let started = Instant::now();
                let result = self.tools.execute(&call, &cancel).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                match result {
                    Ok(tool_result) => {
                        let pointer = match self.context.put(&tc.name, &args, &tool_result.output)
                        {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(tool = %tc.name, error = %e, "Failed to store tool context");
                                "ctx-unavailable".to_string()
                            }
                        };
                        let rendered = ToolContextStore::render_inline(
                            &tool_result.output,
                            &pointer,
                            self.config.max_inline_chars,
                        );

                        if tx
                            .send(AgentEvent::ToolEnd {
                                tool: tc.name.clone(),
                                result: rendered.clone(),
                                duration_ms,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                        pad.observe(&tc.id, true, &rendered, duration_ms);
                        batch_messages.push(Message::tool_result(&tc.id, &rendered));
                    }
                    Err(ToolError::Cancelled(_)) => {
                        debug!(session = %key, tool = %tc.name, "Cancelled during tool call");
                        return;
                    }
                    Err(e) => {
                        let error = e.to_string();
                        warn!(session = %key, tool = %tc.name, error = %error, "Tool failed");

                        if tx
                            .send(AgentEvent::ToolError {
                                tool: tc.name.clone(),
                                error: error.clone(),
                                duration_ms: Some(duration_ms),
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                        pad.observe(&tc.id, false, &error, duration_ms);
                        batch_messages.push(Message::tool_result(&tc.id, format!("Error: {error}")));
                    }
                }

                // Soft limits: advisory nudges, never a termination.
                if category == "search"
                    && pad.count_category("search") == self.config.search_soft_limit + 1
                    && warned_categories.insert("search".into())
                {
                    let reason = format!(
                        "You have made {} search calls; prefer answering with what you already have.",
                        self.config.search_soft_limit + 1
                    );
                    pad.limit_notice(&reason);
                    if tx.send(AgentEvent::ToolLimit { reason }).await.is_err() {
                        return;
                    }
                }
                if pad.act_count() == self.config.overall_soft_limit + 1
                    && warned_categories.insert("overall".into())
                {
                    let reason = format!(
                        "You have made {} tool calls in total; wrap up and answer now.",
                        self.config.overall_soft_limit + 1
                    );
                    pad.limit_notice(&reason);
                    if tx.send(AgentEvent::ToolLimit { reason }).await.is_err() {
                        return;
                    }
                }
            }

            // Persist the round: assistant trace first, then tool results,
            // so history replay reconstructs the same prompt order.
            let mut trace = Message::assistant(thinking);
            trace.tool_calls = tool_calls;
            if let Err(e) = self.sessions.append(&key, &trace).await {
                warn!(session = %key, error = %e, "Failed to persist assistant trace");
            }
            for msg in batch_messages {
                if let Err(e) = self.sessions.append(&key, &msg).await {
                    warn!(session = %key, error = %e, "Failed to persist tool result");
                }
            }
        }

        if !finished_naturally {
            let reason = format!(
                "Iteration limit ({}) reached; answering with the information gathered so far.",
                self.config.max_iterations
            );
            pad.limit_notice(&reason);
            if tx.send(AgentEvent::ToolLimit { reason }).await.is_err() {
                return;
            }
        }

        // ── Phase 3: Answer ──
        if cancel.is_cancelled() {
            return;
        }
        if tx.send(AgentEvent::AnswerStart).await.is_err() {
            return;
        }

        let mut messages = base.clone();
        if !pad.is_empty() {
            messages.push(Message::user(format!("## Work so far\n\n{}", pad.render())));
        }
        let request = ProviderRequest::without_tools(
            self.config.model.clone(),
            messages,
            self.config.temperature,
        );

        debug_assert!(
            !pad.has_dangling_act(),
            "answer phase entered with an unobserved act"
        );
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            s = self.provider.stream(request) => s,
        };

        let mut answer = String::new();
        match stream {
            Ok(mut chunks) => loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => return,
                    c = chunks.recv() => c,
                };
                match chunk {
                    Some(Ok(chunk)) => {
                        if let Some(text) = chunk.content {
                            if !text.is_empty() {
                                answer.push_str(&text);
                                if tx
                                    .send(AgentEvent::AnswerChunk { chunk: text })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        // Best-effort: keep whatever was buffered.
                        warn!(session = %key, error = %e, "Answer stream interrupted");
                        break;
                    }
                    None => break,
                }
            },
            Err(e) => {
                warn!(session = %key, error = %e, "Failed to open answer stream");
                answer = APOLOGY.into();
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        let _ = tx
            .send(AgentEvent::Done {
                answer: answer.clone(),
                iterations,
                tool_calls: summaries,
            })
            .await;

        if let Err(e) = self.sessions.append(&key, &Message::assistant(&answer)).await {
            warn!(session = %key, error = %e, "Failed to persist answer");
        }

        let question_head: String = query.chars().take(MEMORY_SUMMARY_CHARS).collect();
        let answer_head: String = answer.chars().take(MEMORY_SUMMARY_CHARS).collect();
        if let Err(e) = self.memory.record(&key, &question_head, &answer_head).await {
            warn!(session = %key, error = %e, "Failed to record memory");
        }

        info!(
            session = %key,
            iterations,
            answer_chars = answer.len(),
            "Query completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use async_trait::async_trait;
    use miniagent_core::tool::{Tool, ToolResult};
    use miniagent_core::Role;

    struct StubSearchTool;

    #[async_trait]
    impl Tool for StubSearchTool {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "Search the web"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            })
        }
        fn limit_category(&self) -> &str {
            "search"
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            let q = arguments["query"].as_str().unwrap_or_default();
            Ok(ToolResult {
                call_id: String::new(),
                output: format!("{q} at 190"),
            })
        }
    }

    struct BigOutputTool;

    #[async_trait]
    impl Tool for BigOutputTool {
        fn name(&self) -> &str {
            "dump"
        }
        fn description(&self) -> &str {
            "Returns a huge blob"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult {
                call_id: String::new(),
                output: "x".repeat(100_000),
            })
        }
    }

    struct FlakyTool;

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "flaky".into(),
                reason: "upstream unavailable".into(),
            })
        }
    }

    /// Blocks until cancelled — for the disconnect scenario.
    struct BlockingTool;

    #[async_trait]
    impl Tool for BlockingTool {
        fn name(&self) -> &str {
            "block"
        }
        fn description(&self) -> &str {
            "Waits for cancellation"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            cancel.cancelled().await;
            Err(ToolError::Cancelled("block".into()))
        }
    }

    struct Fixture {
        agent: AgentLoop,
        sessions: Arc<SessionStore>,
        context: Arc<ToolContextStore>,
        memory: Arc<MemoryIndex>,
        _dir: tempfile::TempDir,
    }

    fn fixture(provider: SequentialMockProvider, config: LoopConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::new(dir.path()));
        let context = Arc::new(ToolContextStore::new(dir.path()));
        let memory = Arc::new(MemoryIndex::new(dir.path()));

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubSearchTool));
        registry.register(Box::new(BigOutputTool));
        registry.register(Box::new(FlakyTool));
        registry.register(Box::new(BlockingTool));

        let agent = AgentLoop::new(
            Arc::new(provider),
            Arc::new(registry),
            sessions.clone(),
            context.clone(),
            memory.clone(),
            config,
        );
        Fixture {
            agent,
            sessions,
            context,
            memory,
            _dir: dir,
        }
    }

    async fn collect(agent: &AgentLoop, query: &str, key: &str) -> Vec<AgentEvent> {
        let mut rx = agent.run_stream(query, key, CancellationToken::new());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn done_of(events: &[AgentEvent]) -> (&String, usize, &Vec<ToolCallSummary>) {
        match events.last().expect("no events") {
            AgentEvent::Done {
                answer,
                iterations,
                tool_calls,
            } => (answer, *iterations, tool_calls),
            other => panic!("Expected Done last, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_tool_short_answer() {
        let provider = SequentialMockProvider::from_ok(vec![
            make_text_response("direct"),
            make_text_response("Hello there!"),
        ]);
        let f = fixture(provider, LoopConfig::default());

        let events = collect(&f.agent, "Say hello.", "greet").await;

        assert!(matches!(events[0], AgentEvent::AnswerStart));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::AnswerChunk { .. })));
        let (answer, iterations, tool_calls) = done_of(&events);
        assert_eq!(answer, "Hello there!");
        assert_eq!(iterations, 1);
        assert!(tool_calls.is_empty());

        // Session now holds [user, assistant].
        let messages = f
            .sessions
            .load(&SessionKey::normalize("greet"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello there!");
    }

    #[tokio::test]
    async fn single_tool_round() {
        let provider = SequentialMockProvider::from_ok(vec![
            make_tool_call_response(
                vec![make_tool_call(
                    "call_1",
                    "web_search",
                    serde_json::json!({"query": "AAPL"}),
                )],
                "I should look up the price",
            ),
            make_text_response("done reasoning"),
            make_text_response("AAPL trades at 190."),
        ]);
        let f = fixture(provider, LoopConfig::default());

        let events = collect(&f.agent, "What is AAPL price?", "stocks").await;

        assert!(events.iter().any(
            |e| matches!(e, AgentEvent::Thinking { message } if message.contains("look up"))
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolStart { tool, args }
                if tool == "web_search" && args["query"] == "AAPL"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolEnd { tool, result, .. }
                if tool == "web_search" && result == "AAPL at 190"
        )));

        let (answer, iterations, tool_calls) = done_of(&events);
        assert_eq!(answer, "AAPL trades at 190.");
        assert_eq!(iterations, 2);
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].tool, "web_search");

        // Event ordering: tool_start < tool_end < answer_start.
        let pos = |pred: &dyn Fn(&AgentEvent) -> bool| events.iter().position(|e| pred(e)).unwrap();
        let start = pos(&|e| matches!(e, AgentEvent::ToolStart { .. }));
        let end = pos(&|e| matches!(e, AgentEvent::ToolEnd { .. }));
        let ans = pos(&|e| matches!(e, AgentEvent::AnswerStart));
        assert!(start < end && end < ans);
    }

    #[tokio::test]
    async fn tool_failure_recovery() {
        let provider = SequentialMockProvider::from_ok(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "flaky", serde_json::json!({}))],
                "",
            ),
            make_tool_call_response(
                vec![make_tool_call(
                    "call_2",
                    "web_search",
                    serde_json::json!({"query": "fallback"}),
                )],
                "",
            ),
            make_text_response("done"),
            make_text_response("Recovered answer."),
        ]);
        let f = fixture(provider, LoopConfig::default());

        let events = collect(&f.agent, "Try the flaky path", "recovery").await;

        let error_pos = events
            .iter()
            .position(|e| matches!(e, AgentEvent::ToolError { tool, .. } if tool == "flaky"))
            .expect("missing tool_error");
        let retry_pos = events
            .iter()
            .position(
                |e| matches!(e, AgentEvent::ToolStart { tool, .. } if tool == "web_search"),
            )
            .expect("missing retry tool_start");
        assert!(error_pos < retry_pos);

        let (answer, iterations, _) = done_of(&events);
        assert_eq!(answer, "Recovered answer.");
        assert!(iterations >= 2);
    }

    #[tokio::test]
    async fn pointer_inlining_bounds_prompt_share() {
        let provider = SequentialMockProvider::from_ok(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "dump", serde_json::json!({}))],
                "",
            ),
            make_text_response("done"),
            make_text_response("Summarised."),
        ]);
        let config = LoopConfig {
            max_inline_chars: 2048,
            ..LoopConfig::default()
        };
        let f = fixture(provider, config);

        let events = collect(&f.agent, "Dump the blob", "blob").await;

        let rendered = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolEnd { result, .. } => Some(result.clone()),
                _ => None,
            })
            .expect("missing tool_end");

        // Rendered form is bounded: inline budget plus a short placeholder.
        assert!(rendered.len() < 2048 + 120);

        // The pointer inside the placeholder resolves to the full 100 KB.
        let pointer_start = rendered.find("ctx-").expect("no pointer in rendered form");
        let pointer: String = rendered[pointer_start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        let entry = f.context.get(&pointer).unwrap();
        assert_eq!(entry.full_result_text.len(), 100_000);
    }

    #[tokio::test]
    async fn iteration_cap_forces_answer() {
        // The model asks for a tool every round; N_iter = 2.
        let provider = SequentialMockProvider::from_ok(vec![
            make_tool_call_response(
                vec![make_tool_call(
                    "call_1",
                    "web_search",
                    serde_json::json!({"query": "a"}),
                )],
                "",
            ),
            make_tool_call_response(
                vec![make_tool_call(
                    "call_2",
                    "web_search",
                    serde_json::json!({"query": "b"}),
                )],
                "",
            ),
            make_text_response("Best effort answer."),
        ]);
        let config = LoopConfig {
            max_iterations: 2,
            ..LoopConfig::default()
        };
        let f = fixture(provider, config);

        let events = collect(&f.agent, "Loop forever", "capped").await;

        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolLimit { reason } if reason.contains("Iteration limit"))));
        let (_, iterations, tool_calls) = done_of(&events);
        assert_eq!(iterations, 2);
        assert_eq!(tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn search_soft_limit_warns_once() {
        let calls: Vec<_> = (0..6)
            .map(|i| {
                make_tool_call(
                    &format!("call_{i}"),
                    "web_search",
                    serde_json::json!({"query": format!("q{i}")}),
                )
            })
            .collect();
        let provider = SequentialMockProvider::from_ok(vec![
            make_tool_call_response(calls, ""),
            make_text_response("done"),
            make_text_response("Answer."),
        ]);
        let f = fixture(provider, LoopConfig::default());

        let events = collect(&f.agent, "Search a lot", "limits").await;

        let warnings: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolLimit { reason } if reason.contains("search")))
            .collect();
        assert_eq!(warnings.len(), 1);
        // Advisory only: all six calls still ran.
        let (_, _, tool_calls) = done_of(&events);
        assert_eq!(tool_calls.len(), 6);
    }

    #[tokio::test]
    async fn cancellation_stops_events_and_persistence() {
        let provider = SequentialMockProvider::from_ok(vec![make_tool_call_response(
            vec![make_tool_call("call_1", "block", serde_json::json!({}))],
            "",
        )]);
        let f = fixture(provider, LoopConfig::default());

        let cancel = CancellationToken::new();
        let mut rx = f.agent.run_stream("Hang forever", "cancelme", cancel.clone());

        // Wait for the tool to start, then simulate a client disconnect.
        let mut saw_start = false;
        let mut post_cancel_events = Vec::new();
        while let Some(event) = rx.recv().await {
            if matches!(event, AgentEvent::ToolStart { .. }) {
                saw_start = true;
                cancel.cancel();
            } else if saw_start {
                post_cancel_events.push(event);
            }
        }
        assert!(saw_start);
        assert!(
            post_cancel_events.is_empty(),
            "events after cancellation: {post_cancel_events:?}"
        );

        // Only the user message was persisted.
        let messages = f
            .sessions
            .load(&SessionKey::normalize("cancelme"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn provider_error_yields_apologetic_done() {
        let provider = SequentialMockProvider::new(vec![Err(
            miniagent_core::ProviderError::Network("connection refused".into()),
        )]);
        let f = fixture(provider, LoopConfig::default());

        let events = collect(&f.agent, "Hello?", "llmdown").await;

        assert_eq!(events.len(), 1);
        let (answer, _, _) = done_of(&events);
        assert!(answer.contains("could not finish"));

        let messages = f
            .sessions
            .load(&SessionKey::normalize("llmdown"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, APOLOGY);
    }

    #[tokio::test]
    async fn done_answer_equals_chunk_concatenation() {
        let provider = SequentialMockProvider::from_ok(vec![make_text_response("direct")])
            .with_stream_chunks(vec!["Hel", "lo ", "world"]);
        let f = fixture(provider, LoopConfig::default());

        let events = collect(&f.agent, "Say hello.", "chunks").await;

        let concatenated: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::AnswerChunk { chunk } => Some(chunk.as_str()),
                _ => None,
            })
            .collect();
        let (answer, _, _) = done_of(&events);
        assert_eq!(answer, &concatenated);
        assert_eq!(answer, "Hello world");
    }

    #[tokio::test]
    async fn memory_recorded_after_answer() {
        let provider = SequentialMockProvider::from_ok(vec![
            make_text_response("direct"),
            make_text_response("Rust is a systems language."),
        ]);
        let f = fixture(provider, LoopConfig::default());

        collect(&f.agent, "Tell me about rust", "memories").await;

        let hits = f
            .memory
            .recall(&SessionKey::normalize("memories"), "rust", 3);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].answer_summary.contains("systems language"));
    }

    #[tokio::test]
    async fn history_replayed_into_followup_prompt() {
        let provider = SequentialMockProvider::from_ok(vec![
            make_text_response("direct"),
            make_text_response("First answer."),
        ]);
        let f = fixture(provider, LoopConfig::default());
        collect(&f.agent, "First question", "followup").await;

        let messages = f
            .sessions
            .load(&SessionKey::normalize("followup"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);

        // A second query sees the prior exchange in its history.
        let provider2 = SequentialMockProvider::from_ok(vec![
            make_text_response("direct"),
            make_text_response("Second answer."),
        ]);
        let agent2 = AgentLoop::new(
            Arc::new(provider2),
            f.agent.tools().clone(),
            f.sessions.clone(),
            f.context.clone(),
            f.memory.clone(),
            LoopConfig::default(),
        );
        let events = collect(&agent2, "Second question", "followup").await;
        let (answer, _, _) = done_of(&events);
        assert_eq!(answer, "Second answer.");

        let messages = f
            .sessions
            .load(&SessionKey::normalize("followup"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 4);
    }
}

//! End-to-end coverage for the run lifecycle: drives the real
//! orchestrator (workflow + approval gate + run registry) and, for the
//! one case the registry can't observe directly, the agent engine on
//! its own, through scripted `LlmProvider`/`ToolServer`/`MemoryStore`
//! doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use fathom::orchestrator::{execute_run, RegistryTrackingSuspender, ToolServerExecutor};
use fathom_agent::{run_agent, TurnResult};
use fathom_approval::InProcessSuspender;
use fathom_domain::config::AgentConfig;
use fathom_domain::error::Result as DomainResult;
use fathom_domain::ports::{ActionExecutor, MemoryDocument, MemoryMessage, MemoryStore, ToolOutcome, ToolServer};
use fathom_domain::run::RunStatus;
use fathom_domain::tool::{ToolCall, ToolDefinition};
use fathom_providers::traits::{ChatRequest, ChatResponse, LlmProvider};
use fathom_runs::RunRegistry;

struct StubMemory;

#[async_trait]
impl MemoryStore for StubMemory {
    async fn store_document(&self, _content: &str, _metadata: Value) -> DomainResult<String> {
        Ok("doc-1".to_string())
    }
    async fn semantic_search(&self, _query: &str, _top_k: usize) -> DomainResult<Vec<MemoryDocument>> {
        Ok(vec![])
    }
    async fn store_message(&self, _conversation_id: &str, _role: &str, _content: &str) -> DomainResult<()> {
        Ok(())
    }
    async fn get_conversation_history(&self, _conversation_id: &str, _limit: usize) -> DomainResult<Vec<MemoryMessage>> {
        Ok(vec![])
    }
}

struct StubToolServer;

#[async_trait]
impl ToolServer for StubToolServer {
    async fn list_tools(&self) -> DomainResult<Vec<ToolDefinition>> {
        Ok(vec![
            ToolDefinition {
                name: "web_search".to_string(),
                description: "Search the web.".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            },
            ToolDefinition {
                name: "delete_file".to_string(),
                description: "Delete a file.".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}}),
            },
        ])
    }
    async fn call_tool(&self, name: &str, _arguments: Value) -> DomainResult<ToolOutcome> {
        match name {
            "web_search" => Ok(ToolOutcome::ok(r#"[{"title":"Example","url":"https://example.com","snippet":"hi"}]"#)),
            "delete_file" => panic!("delete_file must never be dispatched without clearing the approval gate"),
            other => panic!("unexpected tool call: {other}"),
        }
    }
}

/// First call answers the gap detector's json-mode probe with "no gaps",
/// second proposes one `web_search` call, third gives a final answer.
/// Mirrors the pattern the agent engine's own tests use for a scripted
/// model: branch on `req.json_mode` first, then on a call counter.
struct OneSearchThenAnswerLlm {
    call_count: AtomicUsize,
}

impl OneSearchThenAnswerLlm {
    fn new() -> Self {
        Self { call_count: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LlmProvider for OneSearchThenAnswerLlm {
    async fn chat(&self, req: ChatRequest) -> DomainResult<ChatResponse> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        if req.json_mode {
            return Ok(ChatResponse {
                content: r#"{"missing_capabilities": [], "reasoning": "tools suffice"}"#.to_string(),
                tool_calls: vec![],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("stop".to_string()),
            });
        }
        if n == 1 {
            Ok(ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "call-1".to_string(),
                    tool_name: "web_search".to_string(),
                    arguments: serde_json::json!({"query": "daily trends"}),
                }],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("tool_calls".to_string()),
            })
        } else {
            Ok(ChatResponse {
                content: r#"{"answer": "trends summarized", "reasoning": "one search was enough", "confidence": 0.9}"#.to_string(),
                tool_calls: vec![],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    fn provider_id(&self) -> &str {
        "one-search-then-answer"
    }
}

#[tokio::test]
async fn happy_path_completes_on_its_first_pass_with_no_approval_needed() {
    let registry = RunRegistry::new();
    let run = registry.create_run("daily trends", "user-1");
    let initial = run.state.clone().with_max_iterations(1);

    let tool_server: Arc<dyn ToolServer> = Arc::new(StubToolServer);
    let memory: Arc<dyn MemoryStore> = Arc::new(StubMemory);
    let llm: Arc<dyn LlmProvider> = Arc::new(OneSearchThenAnswerLlm::new());
    let executor: Arc<dyn ActionExecutor> = Arc::new(ToolServerExecutor::new(tool_server.clone()));
    let suspender = Arc::new(RegistryTrackingSuspender::new(registry.clone(), InProcessSuspender::new()));

    execute_run(
        run.id,
        initial,
        registry.clone(),
        tool_server,
        memory,
        llm,
        executor,
        suspender,
        AgentConfig::default(),
        300,
    )
    .await;

    let fetched = registry.get_run(run.id).expect("run must still be registered");
    assert_eq!(fetched.status, RunStatus::Completed);
    assert_eq!(fetched.state.iteration_count, 1);

    let report = registry.get_report(run.id).expect("a completed run must produce a readable report");
    assert!(!report.markdown.is_empty());
}

/// Never proposes a tool call and never clears the source/quality bar,
/// so the only way the run ends is by exhausting `max_iterations`.
struct NeverSatisfiedLlm;

#[async_trait]
impl LlmProvider for NeverSatisfiedLlm {
    async fn chat(&self, _req: ChatRequest) -> DomainResult<ChatResponse> {
        Ok(ChatResponse {
            content: r#"{"answer": "partial", "reasoning": "still gathering sources", "confidence": 0.4}"#.to_string(),
            tool_calls: vec![],
            usage: None,
            model: "scripted".to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_id(&self) -> &str {
        "never-satisfied"
    }
}

#[tokio::test]
async fn low_quality_run_stops_at_the_iteration_cap_instead_of_looping_forever() {
    let registry = RunRegistry::new();
    let run = registry.create_run("a topic with no good sources", "user-1");
    let initial = run.state.clone().with_max_iterations(3);

    let tool_server: Arc<dyn ToolServer> = Arc::new(StubToolServer);
    let memory: Arc<dyn MemoryStore> = Arc::new(StubMemory);
    let llm: Arc<dyn LlmProvider> = Arc::new(NeverSatisfiedLlm);
    let executor: Arc<dyn ActionExecutor> = Arc::new(ToolServerExecutor::new(tool_server.clone()));
    let suspender = Arc::new(RegistryTrackingSuspender::new(registry.clone(), InProcessSuspender::new()));

    execute_run(
        run.id,
        initial,
        registry.clone(),
        tool_server,
        memory,
        llm,
        executor,
        suspender,
        AgentConfig::default(),
        300,
    )
    .await;

    let fetched = registry.get_run(run.id).expect("run must still be registered");
    assert_eq!(fetched.status, RunStatus::Completed);
    assert_eq!(fetched.state.iteration_count, 3);
    assert!(fetched.state.sources.is_empty());
}

/// First call answers the gap probe, second proposes an irreversible
/// `delete_file` call that the engine must defer to the approval gate
/// instead of dispatching, third gives a final answer once the
/// deferral message comes back.
struct ProposesDeleteThenAnswersLlm {
    call_count: AtomicUsize,
}

impl ProposesDeleteThenAnswersLlm {
    fn new() -> Self {
        Self { call_count: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LlmProvider for ProposesDeleteThenAnswersLlm {
    async fn chat(&self, req: ChatRequest) -> DomainResult<ChatResponse> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        if req.json_mode {
            return Ok(ChatResponse {
                content: r#"{"missing_capabilities": [], "reasoning": "tools suffice"}"#.to_string(),
                tool_calls: vec![],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("stop".to_string()),
            });
        }
        if n == 1 {
            Ok(ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "call-1".to_string(),
                    tool_name: "delete_file".to_string(),
                    arguments: serde_json::json!({"path": "/tmp/stale-report.md"}),
                }],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("tool_calls".to_string()),
            })
        } else {
            Ok(ChatResponse {
                content: r#"{"answer": "cleaned up", "reasoning": "removed the stale report", "confidence": 0.9}"#.to_string(),
                tool_calls: vec![],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    fn provider_id(&self) -> &str {
        "proposes-delete-then-answers"
    }
}

#[tokio::test(start_paused = true)]
async fn unresolved_approval_escalates_the_run_once_its_timeout_elapses() {
    let registry = RunRegistry::new();
    let run = registry.create_run("clean up stale reports", "user-1");
    let initial = run.state.clone().with_max_iterations(1);

    let tool_server: Arc<dyn ToolServer> = Arc::new(StubToolServer);
    let memory: Arc<dyn MemoryStore> = Arc::new(StubMemory);
    let llm: Arc<dyn LlmProvider> = Arc::new(ProposesDeleteThenAnswersLlm::new());
    let executor: Arc<dyn ActionExecutor> = Arc::new(ToolServerExecutor::new(tool_server.clone()));
    let suspender = Arc::new(RegistryTrackingSuspender::new(registry.clone(), InProcessSuspender::new()));

    execute_run(
        run.id,
        initial,
        registry.clone(),
        tool_server,
        memory,
        llm,
        executor,
        suspender,
        AgentConfig::default(),
        1,
    )
    .await;

    let fetched = registry.get_run(run.id).expect("run must still be registered");
    assert_eq!(fetched.status, RunStatus::Escalated);
    assert_eq!(
        fetched.error.as_deref(),
        Some("one or more planned actions were escalated for review")
    );
}

/// Answers the gap probe by reporting a capability the tool set can't
/// cover, so `run_agent` never even enters the tool-call loop.
struct ReportsGapLlm;

#[async_trait]
impl LlmProvider for ReportsGapLlm {
    async fn chat(&self, req: ChatRequest) -> DomainResult<ChatResponse> {
        assert!(req.json_mode, "the gap detector's probe must be the only call made this run");
        Ok(ChatResponse {
            content: r#"{"missing_capabilities": ["financial_data_api"], "reasoning": "no tool can fetch account balances"}"#
                .to_string(),
            tool_calls: vec![],
            usage: None,
            model: "scripted".to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_id(&self) -> &str {
        "reports-gap"
    }
}

#[tokio::test]
async fn missing_capability_short_circuits_the_run_before_any_tool_call() {
    let registry = RunRegistry::new();
    let run = registry.create_run("reconcile my brokerage statement", "user-1");
    let initial = run.state.clone();

    let tool_server: Arc<dyn ToolServer> = Arc::new(StubToolServer);
    let memory: Arc<dyn MemoryStore> = Arc::new(StubMemory);
    let llm: Arc<dyn LlmProvider> = Arc::new(ReportsGapLlm);
    let executor: Arc<dyn ActionExecutor> = Arc::new(ToolServerExecutor::new(tool_server.clone()));
    let suspender = Arc::new(RegistryTrackingSuspender::new(registry.clone(), InProcessSuspender::new()));

    execute_run(
        run.id,
        initial,
        registry.clone(),
        tool_server,
        memory,
        llm,
        executor,
        suspender,
        AgentConfig::default(),
        300,
    )
    .await;

    let fetched = registry.get_run(run.id).expect("run must still be registered");
    assert_eq!(fetched.status, RunStatus::Failed);
    let error = fetched.error.expect("a capability gap must record why the run failed");
    assert!(error.contains("capability gap"), "unexpected error: {error}");
    assert!(error.contains("no tool can fetch account balances"), "unexpected error: {error}");
}

struct NoopToolServer;

#[async_trait]
impl ToolServer for NoopToolServer {
    async fn list_tools(&self) -> DomainResult<Vec<ToolDefinition>> {
        Ok(vec![ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }])
    }
    async fn call_tool(&self, _name: &str, _arguments: Value) -> DomainResult<ToolOutcome> {
        Ok(ToolOutcome::ok("SKIPPED: this query was already searched in this turn."))
    }
}

/// Answers the gap probe, then proposes the exact same `web_search`
/// call on every subsequent turn — nothing ever changes the query, so
/// the loop guard must be the thing that ends the run.
struct RepeatsTheSameSearchLlm;

#[async_trait]
impl LlmProvider for RepeatsTheSameSearchLlm {
    async fn chat(&self, req: ChatRequest) -> DomainResult<ChatResponse> {
        if req.json_mode {
            return Ok(ChatResponse {
                content: r#"{"missing_capabilities": [], "reasoning": "tools suffice"}"#.to_string(),
                tool_calls: vec![],
                usage: None,
                model: "scripted".to_string(),
                finish_reason: Some("stop".to_string()),
            });
        }
        Ok(ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                call_id: "repeat".to_string(),
                tool_name: "web_search".to_string(),
                arguments: serde_json::json!({"query": "same query every time"}),
            }],
            usage: None,
            model: "scripted".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        })
    }

    fn provider_id(&self) -> &str {
        "repeats-the-same-search"
    }
}

#[tokio::test]
async fn identical_tool_call_repeated_three_times_trips_the_loop_guard() {
    let tool_server = NoopToolServer;
    let memory = StubMemory;
    let llm = RepeatsTheSameSearchLlm;
    let config = AgentConfig::default();

    let result = run_agent("find the same thing over and over", &tool_server, &memory, &llm, &config, None).await;
    match result {
        TurnResult::Response(response) => {
            assert_eq!(response.confidence, 0.0);
            assert!(response.answer.is_empty());
            let last = response.tool_calls.last().expect("the capped call must still be logged");
            let error = last.error.as_deref().unwrap_or_default();
            assert!(error.contains("loop detected"), "unexpected error on capped call: {error}");
        }
        TurnResult::GapReport(_) => panic!("expected a degraded response, not a capability gap"),
    }
}

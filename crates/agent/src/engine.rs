//! C2 — the Agent Execution Engine.
//!
//! `run_agent` drives one research turn: a pre-flight capability check,
//! then a tool-call loop mediated entirely by [`RunContext`], until the
//! model produces a structured answer or a cap trips. No error escapes
//! this function — every failure mode in spec §7 becomes either a
//! degraded [`AgentResponse`] or a [`ToolGapReport`].

use serde_json::Value;

use fathom_domain::config::AgentConfig;
use fathom_domain::ports::{MemoryStore, ToolServer};
use fathom_domain::research::{AgentResponse, LlmTurnOutput, PlannedAction, ToolGapReport};
use fathom_domain::tool::{Message, ToolDefinition};
use fathom_providers::traits::{ChatRequest, LlmProvider};

use crate::capability::AgentCapabilities;
use crate::dispatch::{cap_to_agent_error, CachePolicy, DispatchOutcome, RunContext};
use crate::gap;

pub enum TurnResult {
    Response(AgentResponse),
    GapReport(ToolGapReport),
}

const SYSTEM_PROMPT: &str = "You are a research agent. Follow a memory-first workflow: call \
    search_memory exactly once at the start of the turn. If it returns no useful results, proceed \
    to web_search. Never repeat an identical tool call. Once you have gathered enough information, \
    stop calling tools and respond with a final JSON object of the form \
    {\"answer\": \"...\", \"reasoning\": \"...\", \"confidence\": 0.0-1.0}. Do not wrap it in markdown \
    fences. An answer should be stored via store_memory once you are confident in it, then the turn \
    should end.";

/// Execute one research turn. Never panics, never returns an `Err` the
/// caller has to unwrap — see the module doc.
pub async fn run_agent(
    task: &str,
    tool_server: &dyn ToolServer,
    memory: &dyn MemoryStore,
    llm: &dyn LlmProvider,
    config: &AgentConfig,
    max_runtime_seconds: Option<u64>,
) -> TurnResult {
    let span = tracing::info_span!(
        "agent_run",
        task_description = task,
        result_type = tracing::field::Empty,
        confidence_score = tracing::field::Empty,
        tool_calls_count = tracing::field::Empty,
        runtime_budget_seconds = max_runtime_seconds,
    );
    let _enter = span.enter();

    if let Some(report) = gap::detect_gaps(task, tool_server, llm).await {
        span.record("result_type", "ToolGapReport");
        return TurnResult::GapReport(report);
    }

    let capabilities = AgentCapabilities::new(tool_server, memory);
    let mut ctx = RunContext::new(config.clone(), max_runtime_seconds);

    let tool_defs = match tool_definitions(tool_server).await {
        Ok(defs) => defs,
        Err(message) => {
            let response = AgentResponse::degraded(message, ctx.into_tool_log());
            span.record("result_type", "AgentResponse");
            span.record("confidence_score", response.confidence);
            span.record("tool_calls_count", response.tool_calls.len());
            return TurnResult::Response(response);
        }
    };

    let mut messages = vec![Message::system(SYSTEM_PROMPT), Message::user(task)];
    let mut planned_actions: Vec<PlannedAction> = Vec::new();

    loop {
        if ctx.deadline_passed() {
            let response = degraded_for_timeout(config, ctx, planned_actions);
            return finish(span, response);
        }

        let request = ChatRequest {
            messages: messages.clone(),
            tools: tool_defs.clone(),
            ..Default::default()
        };

        let chat_response = match llm.chat(request).await {
            Ok(r) => r,
            Err(err) => {
                let mut response = AgentResponse::degraded(format!("LLM call failed: {err}"), ctx.into_tool_log());
                response.planned_actions = planned_actions;
                return finish(span, response);
            }
        };

        if ctx.deadline_passed() {
            let response = degraded_for_timeout(config, ctx, planned_actions);
            return finish(span, response);
        }

        let turn_output = normalize_llm_output(&chat_response.tool_calls);
        match turn_output {
            Some(LlmTurnOutput::ToolCalls { calls }) => {
                messages.push(Message::assistant(chat_response.content.clone()));
                let mut capped: Option<AgentResponse> = None;
                for call in &calls {
                    if crate::risk::requires_approval(call.risk, call.confidence) {
                        tracing::info!(
                            tool = %call.tool_name,
                            risk = ?call.risk,
                            "deferring side-effecting tool call to the approval gate"
                        );
                        messages.push(Message::tool_result(
                            call.tool_name.clone(),
                            "deferred: this action requires human approval before it can run".to_string(),
                        ));
                        planned_actions.push(call.clone());
                        continue;
                    }

                    let policy = cache_policy_for(&call.tool_name);
                    let arguments = call.parameters.clone();
                    let outcome = ctx
                        .dispatch(&call.tool_name, arguments, policy, |args| capabilities.invoke(&call.tool_name, args))
                        .await;
                    let record = outcome.record().clone();
                    messages.push(Message::tool_result(
                        record.call_id.clone(),
                        summarize_record(&record),
                    ));
                    if let DispatchOutcome::Capped(_, cap) = outcome {
                        let agent_err = cap_to_agent_error(&cap);
                        tracing::warn!(error = %agent_err, "agent turn capped");
                        let mut response = AgentResponse::degraded(agent_err.to_string(), ctx.tool_log().to_vec());
                        response.planned_actions = planned_actions.clone();
                        capped = Some(response);
                        break;
                    }
                }
                if let Some(response) = capped {
                    return finish(span, response);
                }
            }
            None => {
                match normalize_final_answer(&chat_response.content) {
                    Some((answer, reasoning, confidence)) => {
                        let response = AgentResponse {
                            answer,
                            reasoning,
                            tool_calls: ctx.into_tool_log(),
                            confidence,
                            planned_actions,
                        };
                        return finish(span, response);
                    }
                    None => {
                        let mut response = AgentResponse::degraded(
                            "malformed LLM output: expected {answer, reasoning, confidence}",
                            ctx.into_tool_log(),
                        );
                        response.planned_actions = planned_actions;
                        return finish(span, response);
                    }
                }
            }
        }
    }
}

fn finish(span: tracing::Span, response: AgentResponse) -> TurnResult {
    span.record("result_type", "AgentResponse");
    span.record("confidence_score", response.confidence);
    span.record("tool_calls_count", response.tool_calls.len());
    TurnResult::Response(response)
}

fn degraded_for_timeout(config: &AgentConfig, ctx: RunContext, planned_actions: Vec<PlannedAction>) -> AgentResponse {
    let mut response = AgentResponse::degraded(
        format!("run exceeded its {}s wall-clock budget", config.run_timeout_secs),
        ctx.into_tool_log(),
    );
    response.planned_actions = planned_actions;
    response
}

async fn tool_definitions(tool_server: &dyn ToolServer) -> Result<Vec<ToolDefinition>, String> {
    let mut defs = tool_server.list_tools().await.map_err(|e| e.to_string())?;
    defs.push(ToolDefinition {
        name: "search_memory".to_string(),
        description: "Search the long-term memory store for relevant prior context.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "query": {"type": "string"}, "top_k": {"type": "integer"} },
            "required": ["query"],
        }),
    });
    defs.push(ToolDefinition {
        name: "store_memory".to_string(),
        description: "Persist a finding or final answer to the long-term memory store.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "content": {"type": "string"}, "metadata": {"type": "object"} },
            "required": ["content"],
        }),
    });
    Ok(defs)
}

/// Caching policy by tool class, per spec §4.1: idempotent reads are
/// cacheable, anything with a side effect or a single-call guard is not.
fn cache_policy_for(tool_name: &str) -> CachePolicy {
    match tool_name {
        "web_search" | "search" | "read_file" | "get_current_time" => CachePolicy::Cacheable,
        _ => CachePolicy::NotCacheable,
    }
}

fn summarize_record(record: &fathom_domain::research::ToolCallRecord) -> String {
    match &record.error {
        Some(err) => format!("ERROR: {err}"),
        None => record
            .result
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string()),
    }
}

/// Normalize the model's raw reply into a [`LlmTurnOutput`]. Native
/// provider tool calls are authoritative when present; otherwise the
/// content is treated as a candidate final answer (checked separately by
/// [`normalize_final_answer`]).
fn normalize_llm_output(tool_calls: &[fathom_domain::tool::ToolCall]) -> Option<LlmTurnOutput> {
    if tool_calls.is_empty() {
        return None;
    }
    // Native tool-calling APIs don't report a per-call confidence score, so a
    // call proposed this way is treated as unconfirmed rather than certain.
    // Confidence only becomes real once the model states it explicitly in a
    // final answer (see `normalize_final_answer`); until then 0.0 keeps the
    // threshold in `risk::requires_approval` load-bearing for every
    // `ReversibleWithDelay` tool instead of silently bypassing it.
    let calls = tool_calls
        .iter()
        .map(|tc| PlannedAction {
            tool_name: tc.tool_name.clone(),
            parameters: tc.arguments.clone(),
            risk: crate::risk::classify(&tc.tool_name, &tc.arguments),
            confidence: 0.0,
        })
        .collect();
    Some(LlmTurnOutput::ToolCalls { calls })
}

/// Parse a final-answer JSON payload: `{answer, reasoning, confidence}`.
fn normalize_final_answer(content: &str) -> Option<(String, String, f64)> {
    let trimmed = content.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
    let value: Value = serde_json::from_str(trimmed.trim()).ok()?;
    let answer = value.get("answer")?.as_str()?.to_string();
    if answer.is_empty() {
        return None;
    }
    let reasoning = value.get("reasoning").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    if reasoning.is_empty() {
        return None;
    }
    let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0).clamp(0.0, 1.0);
    Some((answer, reasoning, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fathom_domain::error::Result as DomainResult;
    use fathom_domain::ports::{MemoryDocument, MemoryMessage, MemoryStore, ToolOutcome, ToolServer};
    use fathom_domain::tool::ToolCall;
    use fathom_providers::traits::ChatResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneToolServer;

    #[async_trait]
    impl ToolServer for OneToolServer {
        async fn list_tools(&self) -> DomainResult<Vec<ToolDefinition>> {
            Ok(vec![ToolDefinition {
                name: "send_email".to_string(),
                description: "Send an email.".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }])
        }
        async fn call_tool(&self, _name: &str, _arguments: Value) -> DomainResult<ToolOutcome> {
            panic!("send_email must never be dispatched without going through the approval gate");
        }
    }

    struct NoopMemory;

    #[async_trait]
    impl MemoryStore for NoopMemory {
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

    /// First call answers the gap-detector's json-mode probe, second
    /// proposes a `send_email` tool call, third gives a final answer.
    struct ScriptedLlm {
        call_count: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new() -> Self {
            Self { call_count: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
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
                        tool_name: "send_email".to_string(),
                        arguments: serde_json::json!({"to": "a@example.com"}),
                    }],
                    usage: None,
                    model: "scripted".to_string(),
                    finish_reason: Some("tool_calls".to_string()),
                })
            } else {
                Ok(ChatResponse {
                    content: r#"{"answer": "done", "reasoning": "finished", "confidence": 0.9}"#.to_string(),
                    tool_calls: vec![],
                    usage: None,
                    model: "scripted".to_string(),
                    finish_reason: Some("stop".to_string()),
                })
            }
        }

        fn provider_id(&self) -> &str {
            "scripted-test-double"
        }
    }

    #[tokio::test]
    async fn irreversible_tool_call_is_deferred_to_planned_actions_not_dispatched() {
        let tool_server = OneToolServer;
        let memory = NoopMemory;
        let llm = ScriptedLlm::new();
        let config = AgentConfig::default();

        let result = run_agent("send a status email", &tool_server, &memory, &llm, &config, None).await;
        match result {
            TurnResult::Response(response) => {
                assert_eq!(response.planned_actions.len(), 1);
                assert_eq!(response.planned_actions[0].tool_name, "send_email");
                assert_eq!(response.answer, "done");
                assert!(response.tool_calls.is_empty(), "send_email must not appear in the executed tool log");
            }
            TurnResult::GapReport(_) => panic!("expected a completed turn"),
        }
    }

    #[test]
    fn normalize_final_answer_parses_plain_json() {
        let raw = r#"{"answer": "42", "reasoning": "because", "confidence": 0.9}"#;
        let (answer, reasoning, confidence) = normalize_final_answer(raw).unwrap();
        assert_eq!(answer, "42");
        assert_eq!(reasoning, "because");
        assert_eq!(confidence, 0.9);
    }

    #[test]
    fn normalize_final_answer_strips_markdown_fences() {
        let raw = "```json\n{\"answer\": \"42\", \"reasoning\": \"because\", \"confidence\": 0.5}\n```";
        let (answer, ..) = normalize_final_answer(raw).unwrap();
        assert_eq!(answer, "42");
    }

    #[test]
    fn normalize_final_answer_rejects_empty_answer() {
        let raw = r#"{"answer": "", "reasoning": "x", "confidence": 0.5}"#;
        assert!(normalize_final_answer(raw).is_none());
    }

    #[test]
    fn normalize_final_answer_clamps_confidence() {
        let raw = r#"{"answer": "x", "reasoning": "y", "confidence": 5.0}"#;
        let (_, _, confidence) = normalize_final_answer(raw).unwrap();
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn cache_policy_marks_reads_cacheable() {
        assert_eq!(cache_policy_for("read_file"), CachePolicy::Cacheable);
        assert_eq!(cache_policy_for("store_memory"), CachePolicy::NotCacheable);
    }
}

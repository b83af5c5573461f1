//! C4 — the five workflow nodes and the conditional edge out of Critique.
//!
//! Every node is a pure `ResearchState -> ResearchState` (or
//! `ResearchState -> Result<ResearchState, ToolGapReport>` for Research,
//! which is the only node that talks to the outside world). Nothing here
//! mutates in place; each call returns the next state.

use fathom_agent::engine::TurnResult;
use fathom_domain::ports::{MemoryStore, ToolServer};
use fathom_domain::research::{ResearchState, SourceReference, ToolGapReport, WorkflowStatus};
use fathom_providers::traits::LlmProvider;

use crate::report::render_report;

/// Plan: seed `plan` if empty, otherwise leave it untouched (idempotent).
pub fn plan(state: ResearchState) -> ResearchState {
    let state = if state.plan.is_empty() {
        state.with_plan(vec![format!("Research: {}", state.query)])
    } else {
        state
    };
    state.with_status(WorkflowStatus::Researching)
}

/// Research: invoke C2 for one agent turn, fold its output into the
/// state, and advance `iteration_count`. Returns `Err` when the agent
/// reports a capability gap — the caller must surface the report and
/// stop the run without touching Finish.
pub async fn research(
    state: ResearchState,
    tool_server: &dyn ToolServer,
    memory: &dyn MemoryStore,
    llm: &dyn LlmProvider,
    config: &fathom_domain::config::AgentConfig,
    max_runtime_seconds: Option<u64>,
) -> Result<ResearchState, ToolGapReport> {
    let task = format!("Research topic: {}", state.query);
    match fathom_agent::run_agent(&task, tool_server, memory, llm, config, max_runtime_seconds).await {
        TurnResult::GapReport(report) => Err(report),
        TurnResult::Response(response) => {
            if response.confidence == 0.0 && response.answer.is_empty() && looks_like_timeout(&response.reasoning) {
                return Ok(state.with_timed_out("Timed out before completing research."));
            }
            let new_sources = extract_sources(&response.tool_calls);
            let mut planned_actions = state.planned_actions.clone();
            planned_actions.extend(response.planned_actions);
            let state = state
                .with_sources_appended(new_sources)
                .with_findings(response.answer)
                .with_critique(Vec::new(), response.confidence)
                .with_quality_score_updated()
                .with_iteration_incremented()
                .with_planned_actions(planned_actions)
                .with_status(WorkflowStatus::Critiquing);
            Ok(state)
        }
    }
}

fn looks_like_timeout(reasoning: &str) -> bool {
    reasoning.contains("wall-clock budget") || reasoning.contains("RuntimeBudgetExceeded")
}

/// Critique: decide whether this state is good enough to Finish, or
/// needs another Refine→Research round.
pub fn critique(state: ResearchState) -> ResearchState {
    let has_enough_sources = state.has_enough_sources();
    let meets_quality = state.meets_quality();
    let should_refine = state.iteration_count < state.max_iterations && (!has_enough_sources || !meets_quality);
    let status = if should_refine { WorkflowStatus::Refining } else { WorkflowStatus::Finished };
    state.with_status(status)
}

/// Refine: fold critique notes into the plan and go back to Research.
pub fn refine(state: ResearchState) -> ResearchState {
    let mut plan = state.plan.clone();
    for note in &state.critique_notes {
        plan.push(format!("Address critique: {note}"));
    }
    if state.critique_notes.is_empty() {
        plan.push("Gather additional sources to raise quality score.".to_string());
    }
    state.with_plan(plan).with_status(WorkflowStatus::Researching)
}

/// Finish: render the report, persist it if a `MemoryStore` is present,
/// and land on the terminal state. A storage failure never fails the run.
pub async fn finish(state: ResearchState, memory: Option<&dyn MemoryStore>) -> ResearchState {
    let rendered = render_report(&state);

    let state = match memory {
        Some(store) => match store.store_document(&rendered, serde_json::json!({"run_id": state.run_id})).await {
            Ok(id) => state.clone().with_memory_document_id(id),
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist report; continuing without memory_document_id");
                state
            }
        },
        None => state,
    };

    state.with_report(rendered).with_status(WorkflowStatus::Finished)
}

/// Decide the Critique node's outgoing edge, spec §4.4.
pub enum CritiqueEdge {
    Refine,
    Finish,
}

pub fn critique_edge(state: &ResearchState) -> CritiqueEdge {
    if state.status == WorkflowStatus::Finished {
        return CritiqueEdge::Finish;
    }
    if state.iteration_count >= state.max_iterations {
        return CritiqueEdge::Finish;
    }
    if state.sources.len() < 3 || state.quality_score < state.quality_threshold {
        return CritiqueEdge::Refine;
    }
    CritiqueEdge::Finish
}

/// Pull `SourceReference`s out of any tool-call result shaped like a
/// list of `{title, url, snippet}` objects. Malformed entries are
/// silently dropped, not errors — the agent may call unrelated tools.
fn extract_sources(tool_calls: &[fathom_domain::research::ToolCallRecord]) -> Vec<SourceReference> {
    let mut sources = Vec::new();
    for record in tool_calls {
        let Some(result) = &record.result else { continue };
        let items = match result {
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Object(map) => match map.get("results") {
                Some(serde_json::Value::Array(items)) => items.clone(),
                _ => continue,
            },
            _ => continue,
        };
        for item in items {
            let Some(obj) = item.as_object() else { continue };
            let (Some(title), Some(url)) = (
                obj.get("title").and_then(|v| v.as_str()),
                obj.get("url").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let snippet = obj.get("snippet").and_then(|v| v.as_str()).unwrap_or_default();
            sources.push(SourceReference {
                url: url.to_string(),
                title: title.to_string(),
                snippet: snippet.chars().take(1000).collect(),
                retrieved_at: record.started_at,
            });
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn base_state() -> ResearchState {
        ResearchState::new(Uuid::new_v4(), "daily trends")
    }

    #[test]
    fn plan_is_idempotent_on_nonempty_plan() {
        let state = base_state().with_plan(vec!["existing".to_string()]);
        let planned = plan(state.clone());
        assert_eq!(planned.plan, state.plan);
    }

    #[test]
    fn plan_seeds_when_empty() {
        let planned = plan(base_state());
        assert!(!planned.plan.is_empty());
        assert_eq!(planned.status, WorkflowStatus::Researching);
    }

    #[test]
    fn critique_refines_below_source_floor_even_at_perfect_quality() {
        let mut state = base_state();
        state.sources = vec![
            SourceReference { url: "a".into(), title: "a".into(), snippet: String::new(), retrieved_at: chrono::Utc::now() },
            SourceReference { url: "b".into(), title: "b".into(), snippet: String::new(), retrieved_at: chrono::Utc::now() },
        ];
        state.quality_score = 1.0;
        state.iteration_count = 0;
        let result = critique(state);
        assert_eq!(result.status, WorkflowStatus::Refining);
    }

    #[test]
    fn critique_finishes_at_exactly_three_sources_and_threshold_quality() {
        let mut state = base_state();
        state.sources = vec![
            SourceReference { url: "a".into(), title: "a".into(), snippet: String::new(), retrieved_at: chrono::Utc::now() },
            SourceReference { url: "b".into(), title: "b".into(), snippet: String::new(), retrieved_at: chrono::Utc::now() },
            SourceReference { url: "c".into(), title: "c".into(), snippet: String::new(), retrieved_at: chrono::Utc::now() },
        ];
        state.quality_score = state.quality_threshold;
        let result = critique(state);
        assert_eq!(result.status, WorkflowStatus::Finished);
    }

    #[test]
    fn critique_finishes_when_iteration_cap_reached_regardless_of_quality() {
        let mut state = base_state();
        state.iteration_count = state.max_iterations;
        state.quality_score = 0.0;
        let result = critique(state);
        assert_eq!(result.status, WorkflowStatus::Finished);
    }

    #[test]
    fn max_iterations_input_of_six_clamps_to_five() {
        let state = base_state().with_max_iterations(6);
        assert_eq!(state.max_iterations, 5);
    }

    #[test]
    fn extract_sources_drops_malformed_entries() {
        let record = fathom_domain::research::ToolCallRecord {
            call_id: "1".into(),
            tool_name: "web_search".into(),
            arguments: serde_json::json!({}),
            status: fathom_domain::research::ToolCallStatus::Success,
            result: Some(serde_json::json!([
                {"title": "Good", "url": "https://example.com/1", "snippet": "ok"},
                {"title": "Missing url"},
                "not an object",
            ])),
            error: None,
            duration_ms: 10,
            started_at: chrono::Utc::now(),
        };
        let sources = extract_sources(&[record]);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, "Good");
    }
}

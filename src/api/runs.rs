//! Handlers for the five endpoints in spec §6.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use fathom_domain::error::AgentError;
use fathom_domain::ports::ResumeDecision;
use fathom_domain::trace::TraceEvent;

use crate::api::{api_error, status_str};
use crate::AppState;

const MAX_TOPIC_CHARS: usize = 500;
const MAX_USER_ID_CHARS: usize = 255;

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub topic: String,
    pub user_id: String,
    pub client_traceparent: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunLinks {
    #[serde(rename = "self")]
    self_link: String,
    report: String,
}

#[derive(Debug, Serialize)]
struct CreateRunResponse {
    run_id: Uuid,
    status: &'static str,
    links: RunLinks,
}

/// `POST /runs` — spec §6: `{topic, user_id, client_traceparent?}` → 202
/// `{run_id, status, links}`. Kicks off the workflow in a detached task
/// and returns immediately; the run progresses asynchronously.
pub async fn create_run(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CreateRunRequest>) -> Response {
    if req.topic.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "topic must not be empty");
    }
    if req.topic.chars().count() > MAX_TOPIC_CHARS {
        return api_error(StatusCode::BAD_REQUEST, format!("topic exceeds {MAX_TOPIC_CHARS} characters"));
    }
    if req.user_id.chars().count() > MAX_USER_ID_CHARS {
        return api_error(StatusCode::BAD_REQUEST, format!("user_id exceeds {MAX_USER_ID_CHARS} characters"));
    }
    let Some(llm) = state.llm.clone() else {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "no LLM provider configured");
    };

    let parent_context = crate::telemetry::extract_parent_context(&headers, req.client_traceparent.as_deref());
    let span = tracing::info_span!("http.post./runs");
    span.set_parent(parent_context);
    let _entered = span.enter();

    let run = state.registry.create_run(req.topic.clone(), req.user_id.clone());
    TraceEvent::RunCreated { run_id: run.id, user_id: req.user_id.clone(), topic: req.topic.clone() }.emit();

    let mut initial = run.state.clone().with_max_iterations(state.config.workflow.max_iterations);
    initial.quality_threshold = state.config.workflow.quality_threshold;

    let run_id = run.id;
    let registry = state.registry.clone();
    let tool_server = state.tool_server.clone();
    let memory = state.memory.clone();
    let executor = state.executor.clone();
    let suspender = state.approval_suspender.clone();
    let agent_config = state.config.agent.clone();
    let approval_timeout_secs = state.config.approval.timeout_secs;
    let spawn_span = tracing::info_span!(parent: &span, "run.execute", run_id = %run_id);

    tokio::spawn(
        async move {
            crate::orchestrator::execute_run(
                run_id,
                initial,
                registry,
                tool_server,
                memory,
                llm,
                executor,
                suspender,
                agent_config,
                approval_timeout_secs,
            )
            .await;
        }
        .instrument(spawn_span),
    );

    (
        StatusCode::ACCEPTED,
        Json(CreateRunResponse {
            run_id,
            status: status_str(run.status),
            links: RunLinks { self_link: format!("/runs/{run_id}"), report: format!("/runs/{run_id}/report") },
        }),
    )
        .into_response()
}

/// `GET /runs/{run_id}` — the full run record.
pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> Response {
    match state.registry.get_run(run_id) {
        Some(run) => (StatusCode::OK, Json(run)).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "run not found"),
    }
}

/// `GET /runs/{run_id}/report` — `{markdown, sources, metadata}`; 409
/// `NotReady` unless the run is `Completed`.
pub async fn get_report(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> Response {
    match state.registry.get_report(run_id) {
        Ok(report) => {
            (StatusCode::OK, Json(json!({ "markdown": report.markdown, "sources": report.sources, "metadata": report.metadata })))
                .into_response()
        }
        Err(AgentError::NotReady { reason, .. }) => api_error(StatusCode::CONFLICT, reason),
        Err(err) => api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproveQuery {
    pub approver: Option<String>,
}

/// `POST /runs/{run_id}/approve?approver=` — resolves the first pending
/// approval, spec §6.
pub async fn approve_run(State(state): State<AppState>, Path(run_id): Path<Uuid>, Query(q): Query<ApproveQuery>) -> Response {
    let Some(run) = state.registry.get_run(run_id) else {
        return api_error(StatusCode::NOT_FOUND, "run not found");
    };
    let Some(pending) = run.pending_approvals.first().cloned() else {
        return api_error(StatusCode::CONFLICT, "run has no pending approval");
    };

    match state.registry.approve(run_id, q.approver.clone()) {
        Ok(resolved) => {
            state.suspender.resolve(pending.id, ResumeDecision::Approve { approver: q.approver });
            (StatusCode::OK, Json(json!({ "approval_id": resolved.id, "status": "approved" }))).into_response()
        }
        Err(AgentError::NoPendingApproval { .. }) => api_error(StatusCode::CONFLICT, "run has no pending approval"),
        Err(err) => api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectQuery {
    pub rejector: Option<String>,
    pub reason: Option<String>,
}

/// `POST /runs/{run_id}/reject?rejector=&reason=` — resolves the first
/// pending approval as rejected, spec §6.
pub async fn reject_run(State(state): State<AppState>, Path(run_id): Path<Uuid>, Query(q): Query<RejectQuery>) -> Response {
    let Some(run) = state.registry.get_run(run_id) else {
        return api_error(StatusCode::NOT_FOUND, "run not found");
    };
    let Some(pending) = run.pending_approvals.first().cloned() else {
        return api_error(StatusCode::CONFLICT, "run has no pending approval");
    };

    match state.registry.reject(run_id, q.rejector.clone(), q.reason.clone()) {
        Ok(resolved) => {
            state.suspender.resolve(pending.id, ResumeDecision::Reject { rejector: q.rejector, comment: q.reason });
            (StatusCode::OK, Json(json!({ "approval_id": resolved.id, "status": "rejected" }))).into_response()
        }
        Err(AgentError::NoPendingApproval { .. }) => api_error(StatusCode::CONFLICT, "run has no pending approval"),
        Err(err) => api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

//! The HTTP surface: exactly the five endpoints from spec §6, thin glue
//! over the run registry and the orchestrator.

pub mod runs;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/runs", post(runs::create_run))
        .route("/runs/:run_id", get(runs::get_run))
        .route("/runs/:run_id/report", get(runs::get_report))
        .route("/runs/:run_id/approve", post(runs::approve_run))
        .route("/runs/:run_id/reject", post(runs::reject_run))
}

/// Wire status names, spec §6: `queued | running | suspended_approval |
/// completed | failed | escalated`.
pub fn status_str(status: fathom_domain::run::RunStatus) -> &'static str {
    use fathom_domain::run::RunStatus::*;
    match status {
        Queued => "queued",
        Running => "running",
        SuspendedApproval => "suspended_approval",
        Completed => "completed",
        Failed => "failed",
        Escalated => "escalated",
    }
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

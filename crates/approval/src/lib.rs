//! C5 — the Approval Gate: partition `planned_actions` by risk, execute
//! what doesn't need a human, suspend for what does, and roll up an
//! overall status.

pub mod inprocess;

pub use inprocess::InProcessSuspender;

use serde_json::Value;

use fathom_agent::risk::requires_approval;
use fathom_domain::ports::{ActionExecutor, ResumeDecision, SuspendForApproval};
use fathom_domain::research::{ApprovalRequest, ApprovalStatus, PlannedAction, RiskLevel};
use uuid::Uuid;

/// Per-action outcome of the gate, spec §4.5.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action: PlannedAction,
    pub executed: bool,
    pub approval_status: ApprovalOutcome,
    pub execution_result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    NotRequired,
    Approved,
    Rejected,
    Escalated,
}

impl ApprovalOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalOutcome::NotRequired => "not_required",
            ApprovalOutcome::Approved => "approved",
            ApprovalOutcome::Rejected => "rejected",
            ApprovalOutcome::Escalated => "escalated",
        }
    }
}

/// The overall roll-up across every action the gate processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollUp {
    Escalated,
    Rejected,
    Completed,
    Partial,
}

impl RollUp {
    pub fn as_str(self) -> &'static str {
        match self {
            RollUp::Escalated => "escalated",
            RollUp::Rejected => "rejected",
            RollUp::Completed => "completed",
            RollUp::Partial => "partial",
        }
    }
}

/// Run every planned action through the gate in order, returning the
/// per-action results plus the overall roll-up.
pub async fn run_gate(
    run_id: Uuid,
    planned_actions: &[PlannedAction],
    executor: &dyn ActionExecutor,
    suspend: &dyn SuspendForApproval,
    approval_timeout_secs: u64,
) -> (Vec<ActionResult>, RollUp) {
    let mut results = Vec::with_capacity(planned_actions.len());

    for action in planned_actions {
        let result = if !requires_approval(action.risk, action.confidence) {
            execute(action, executor, ApprovalOutcome::NotRequired).await
        } else {
            let request = ApprovalRequest::new(run_id, action.clone(), approval_timeout_secs);
            match suspend.suspend(&request).await {
                ResumeDecision::Approve { .. } => execute(action, executor, ApprovalOutcome::Approved).await,
                ResumeDecision::Reject { comment, .. } => ActionResult {
                    action: action.clone(),
                    executed: false,
                    approval_status: ApprovalOutcome::Rejected,
                    execution_result: None,
                    error: comment,
                },
                ResumeDecision::Escalate { reason } => ActionResult {
                    action: action.clone(),
                    executed: false,
                    approval_status: ApprovalOutcome::Escalated,
                    execution_result: None,
                    error: Some(reason),
                },
            }
        };
        results.push(result);
    }

    let rollup = roll_up(&results);
    (results, rollup)
}

async fn execute(action: &PlannedAction, executor: &dyn ActionExecutor, status: ApprovalOutcome) -> ActionResult {
    match executor.execute(action).await {
        Ok(value) => ActionResult {
            action: action.clone(),
            executed: true,
            approval_status: status,
            execution_result: Some(value),
            error: None,
        },
        Err(err) => ActionResult {
            action: action.clone(),
            executed: false,
            approval_status: status,
            execution_result: None,
            error: Some(err.to_string()),
        },
    }
}

fn roll_up(results: &[ActionResult]) -> RollUp {
    if results.iter().any(|r| r.approval_status == ApprovalOutcome::Escalated) {
        return RollUp::Escalated;
    }
    if results.iter().any(|r| r.approval_status == ApprovalOutcome::Rejected) {
        return RollUp::Rejected;
    }
    let all_ok = results
        .iter()
        .all(|r| matches!(r.approval_status, ApprovalOutcome::Approved | ApprovalOutcome::NotRequired));
    if all_ok {
        RollUp::Completed
    } else {
        RollUp::Partial
    }
}

/// Map an interpreted resume payload's terminal `status`, for callers
/// that need the `ApprovalStatus` domain type rather than this crate's
/// `ApprovalOutcome`.
pub fn to_approval_status(outcome: ApprovalOutcome) -> ApprovalStatus {
    match outcome {
        ApprovalOutcome::NotRequired | ApprovalOutcome::Approved => ApprovalStatus::Approved,
        ApprovalOutcome::Rejected => ApprovalStatus::Rejected,
        ApprovalOutcome::Escalated => ApprovalStatus::Escalated,
    }
}

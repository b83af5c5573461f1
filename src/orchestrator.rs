//! Glues the workflow executor and the approval gate together for one
//! run: drive `fathom_workflow::run_workflow` to completion, then run any
//! `planned_actions` it produced through `fathom_approval::run_gate`,
//! updating the run registry at every stage.
//!
//! Neither `fathom-runs` nor `fathom-approval` know about each other —
//! `RegistryTrackingSuspender` is the seam that lets the registry observe
//! approval suspend/resolve events without either crate depending on the
//! other.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use fathom_approval::{run_gate, InProcessSuspender, RollUp};
use fathom_domain::config::AgentConfig;
use fathom_domain::error::{Error, Result};
use fathom_domain::ports::{ActionExecutor, MemoryStore, ResumeDecision, SuspendForApproval, ToolServer};
use fathom_domain::research::{PlannedAction, ResearchState};
use fathom_domain::trace::TraceEvent;
use fathom_providers::traits::LlmProvider;
use fathom_runs::RunRegistry;
use fathom_workflow::{run_workflow, WorkflowDeps, WorkflowOutcome};

/// Executes a `PlannedAction` that cleared the approval gate by routing it
/// back through the `ToolServer` it was originally going to be dispatched
/// on — reversible actions that bypass approval entirely, and approved
/// irreversible ones, both end up here.
pub struct ToolServerExecutor {
    tool_server: Arc<dyn ToolServer>,
}

impl ToolServerExecutor {
    pub fn new(tool_server: Arc<dyn ToolServer>) -> Self {
        Self { tool_server }
    }
}

#[async_trait]
impl ActionExecutor for ToolServerExecutor {
    async fn execute(&self, action: &PlannedAction) -> Result<Value> {
        let outcome = self.tool_server.call_tool(&action.tool_name, action.parameters.clone()).await?;
        if outcome.is_error {
            return Err(Error::Other(outcome.text()));
        }
        Ok(serde_json::json!({ "result": outcome.text() }))
    }
}

/// Wraps [`InProcessSuspender`] so every suspend/resolve also updates the
/// run registry and emits the `ApprovalRequested`/`ApprovalResolved`
/// trace events — `fathom-approval` itself has no notion of a registry.
pub struct RegistryTrackingSuspender {
    registry: Arc<RunRegistry>,
    inner: Arc<InProcessSuspender>,
}

impl RegistryTrackingSuspender {
    pub fn new(registry: Arc<RunRegistry>, inner: Arc<InProcessSuspender>) -> Self {
        Self { registry, inner }
    }
}

#[async_trait]
impl SuspendForApproval for RegistryTrackingSuspender {
    async fn suspend(&self, request: &fathom_domain::research::ApprovalRequest) -> ResumeDecision {
        // `run_gate` only ever has one request in flight per run at a
        // time, so replacing the whole pending-approvals vec here is
        // equivalent to appending — there is nothing else to append to.
        self.registry.suspend_for_approval(request.run_id, vec![request.clone()]);
        TraceEvent::ApprovalRequested {
            run_id: request.run_id,
            approval_id: request.id,
            tool_name: request.action.tool_name.clone(),
            risk: format!("{:?}", request.action.risk),
        }
        .emit();

        let decision = self.inner.suspend(request).await;

        let status = match &decision {
            ResumeDecision::Approve { .. } => "approved",
            ResumeDecision::Reject { .. } => "rejected",
            ResumeDecision::Escalate { .. } => "escalated",
        };
        TraceEvent::ApprovalResolved { run_id: request.run_id, approval_id: request.id, status: status.to_string() }.emit();

        decision
    }
}

/// Drive one run end-to-end: workflow, then (if needed) the approval
/// gate, then land the run in a terminal registry state. Runs as a
/// detached `tokio::spawn`'d task — the HTTP handler that kicks this off
/// has already returned its 202.
#[allow(clippy::too_many_arguments)]
pub async fn execute_run(
    run_id: Uuid,
    initial: ResearchState,
    registry: Arc<RunRegistry>,
    tool_server: Arc<dyn ToolServer>,
    memory: Arc<dyn MemoryStore>,
    llm: Arc<dyn LlmProvider>,
    executor: Arc<dyn ActionExecutor>,
    suspender: Arc<RegistryTrackingSuspender>,
    agent_config: AgentConfig,
    approval_timeout_secs: u64,
) {
    registry.mark_running(run_id);
    TraceEvent::RunStatusChanged { run_id, from: "queued".to_string(), to: "running".to_string() }.emit();

    let deps = WorkflowDeps {
        tool_server: tool_server.as_ref(),
        memory: memory.as_ref(),
        llm: llm.as_ref(),
        agent_config: &agent_config,
        max_runtime_seconds: Some(agent_config.run_timeout_secs),
    };

    match run_workflow(initial, &deps).await {
        WorkflowOutcome::GapReport(report) => {
            TraceEvent::ToolGapDetected { run_id, missing_capabilities: report.missing_tools.len() }.emit();
            registry.fail(run_id, format!("capability gap: {}", report.reasoning));
        }
        WorkflowOutcome::Completed(state) => {
            if state.planned_actions.is_empty() {
                registry.complete(run_id, state);
                return;
            }

            let planned_actions = state.planned_actions.clone();
            let (_, rollup) =
                run_gate(run_id, &planned_actions, executor.as_ref(), suspender.as_ref(), approval_timeout_secs).await;

            match rollup {
                RollUp::Escalated => registry.escalate(run_id, "one or more planned actions were escalated for review"),
                RollUp::Rejected => registry.fail(run_id, "one or more planned actions were rejected"),
                RollUp::Completed | RollUp::Partial => registry.complete(run_id, state),
            }
        }
    }

    let final_status = registry.get_run(run_id).map(|r| r.status).unwrap_or(fathom_domain::run::RunStatus::Failed);
    TraceEvent::RunStatusChanged {
        run_id,
        from: "running".to_string(),
        to: crate::api::status_str(final_status).to_string(),
    }
    .emit();
}

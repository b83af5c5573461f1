//! C6 — the Run Registry: authoritative per-run state for external
//! observers, decoupled from in-flight workflow execution.
//!
//! Grounded on [`crate::store::SessionStore`]'s locking shape: one
//! `RwLock<HashMap<Uuid, Run>>`, short critical sections, clone-out reads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use fathom_domain::error::{AgentError, AgentResult};
use fathom_domain::research::{ApprovalRequest, ApprovalStatus, ResearchState};
use fathom_domain::run::{Run, RunStatus};

/// `{markdown, sources, metadata}` returned by `get_report`, spec §6.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub markdown: String,
    pub sources: Vec<fathom_domain::research::SourceReference>,
    pub metadata: serde_json::Value,
}

/// Single-process, in-memory run registry. Behind a trait it would be
/// `RunStore`-shaped (spec §9's "keep the registry behind a capability
/// interface" note) — this struct already presents the right surface for
/// a future persistent implementation to replace it without touching C4/C5.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate a new run, `status=Queued`, ready for the caller to hand
    /// off to the workflow executor.
    pub fn create_run(&self, topic: impl Into<String>, user_id: impl Into<String>) -> Run {
        let mut run = Run::new(topic);
        run.state = run.state.with_user_id(user_id);
        self.runs.write().insert(run.id, run.clone());
        run
    }

    pub fn get_run(&self, run_id: Uuid) -> Option<Run> {
        self.runs.read().get(&run_id).cloned()
    }

    pub fn get_report(&self, run_id: Uuid) -> AgentResult<RunReport> {
        let runs = self.runs.read();
        let run = runs.get(&run_id).ok_or(AgentError::NotReady { run_id, reason: "run not found".to_string() })?;
        if run.status != RunStatus::Completed {
            return Err(AgentError::NotReady { run_id, reason: format!("run is {:?}", run.status) });
        }
        let markdown = run.state.report_markdown.clone().unwrap_or_default();
        Ok(RunReport {
            markdown,
            sources: run.state.sources.clone(),
            metadata: serde_json::json!({
                "memory_document_id": run.state.memory_document_id,
                "iteration_count": run.state.iteration_count,
                "quality_score": run.state.quality_score,
            }),
        })
    }

    pub fn mark_running(&self, run_id: Uuid) {
        self.update(run_id, |run| {
            run.status = RunStatus::Running;
        });
    }

    /// Suspend the run for approval, registering one `ApprovalRequest`
    /// per action that needs it (earliest-requested first).
    pub fn suspend_for_approval(&self, run_id: Uuid, requests: Vec<ApprovalRequest>) {
        self.update(run_id, |run| {
            run.status = RunStatus::SuspendedApproval;
            run.pending_approvals = requests;
        });
    }

    pub fn complete(&self, run_id: Uuid, state: ResearchState) {
        self.update(run_id, |run| {
            run.state = state;
            run.status = RunStatus::Completed;
        });
    }

    pub fn fail(&self, run_id: Uuid, message: impl Into<String>) {
        self.update(run_id, |run| {
            run.status = RunStatus::Failed;
            run.error = Some(message.into());
        });
    }

    pub fn escalate(&self, run_id: Uuid, message: impl Into<String>) {
        self.update(run_id, |run| {
            run.status = RunStatus::Escalated;
            run.error = Some(message.into());
        });
    }

    /// Resolve the front of the pending-approval queue as Approved.
    /// `NoPendingApproval` when the run has nothing awaiting a decision.
    pub fn approve(&self, run_id: Uuid, approver: Option<String>) -> AgentResult<ApprovalRequest> {
        self.resolve_first_pending(run_id, ApprovalStatus::Approved, approver)
    }

    pub fn reject(&self, run_id: Uuid, rejector: Option<String>, reason: Option<String>) -> AgentResult<ApprovalRequest> {
        let note = rejector.or(reason);
        self.resolve_first_pending(run_id, ApprovalStatus::Rejected, note)
    }

    fn resolve_first_pending(
        &self,
        run_id: Uuid,
        status: ApprovalStatus,
        decision_note: Option<String>,
    ) -> AgentResult<ApprovalRequest> {
        let mut runs = self.runs.write();
        let run = runs.get_mut(&run_id).ok_or(AgentError::NoPendingApproval { run_id })?;
        if run.pending_approvals.is_empty() {
            return Err(AgentError::NoPendingApproval { run_id });
        }
        let mut resolved = run.pending_approvals.remove(0);
        resolved = resolved.resolve(status, decision_note);
        run.updated_at = Utc::now();
        if run.pending_approvals.is_empty() {
            run.status = match status {
                ApprovalStatus::Approved => RunStatus::Running,
                ApprovalStatus::Rejected => RunStatus::Running,
                _ => run.status,
            };
        }
        Ok(resolved)
    }

    fn update(&self, run_id: Uuid, f: impl FnOnce(&mut Run)) {
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(&run_id) {
            f(run);
            run.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_domain::research::{PlannedAction, RiskLevel};

    #[test]
    fn create_run_starts_queued_and_is_readable() {
        let registry = RunRegistry::new();
        let run = registry.create_run("daily trends", "user-1");
        let fetched = registry.get_run(run.id).unwrap();
        assert_eq!(fetched.status, RunStatus::Queued);
        assert_eq!(fetched.state.user_id, "user-1");
    }

    #[test]
    fn get_report_fails_with_not_ready_before_completion() {
        let registry = RunRegistry::new();
        let run = registry.create_run("topic", "user-1");
        assert!(matches!(registry.get_report(run.id), Err(AgentError::NotReady { .. })));
    }

    #[test]
    fn get_report_succeeds_after_completion() {
        let registry = RunRegistry::new();
        let run = registry.create_run("topic", "user-1");
        let state = run.state.clone().with_report("# done");
        registry.complete(run.id, state);
        let report = registry.get_report(run.id).unwrap();
        assert_eq!(report.markdown, "# done");
    }

    #[test]
    fn approve_with_no_pending_approval_fails() {
        let registry = RunRegistry::new();
        let run = registry.create_run("topic", "user-1");
        assert!(matches!(registry.approve(run.id, None), Err(AgentError::NoPendingApproval { .. })));
    }

    #[test]
    fn approve_resolves_first_pending_in_order() {
        let registry = RunRegistry::new();
        let run = registry.create_run("topic", "user-1");
        let action = |name: &str| PlannedAction {
            tool_name: name.to_string(),
            parameters: serde_json::json!({}),
            risk: RiskLevel::Irreversible,
            confidence: 0.5,
        };
        let first = ApprovalRequest::new(run.id, action("delete_file"), 300);
        let second = ApprovalRequest::new(run.id, action("send_money"), 300);
        let first_id = first.id;
        registry.suspend_for_approval(run.id, vec![first, second]);

        let resolved = registry.approve(run.id, Some("alice".to_string())).unwrap();
        assert_eq!(resolved.id, first_id);
        assert_eq!(resolved.status, ApprovalStatus::Approved);

        let fetched = registry.get_run(run.id).unwrap();
        assert_eq!(fetched.pending_approvals.len(), 1);
        assert_eq!(fetched.status, RunStatus::SuspendedApproval);
    }

    #[test]
    fn resolving_last_pending_approval_moves_run_back_to_running() {
        let registry = RunRegistry::new();
        let run = registry.create_run("topic", "user-1");
        let action = PlannedAction {
            tool_name: "delete_file".to_string(),
            parameters: serde_json::json!({}),
            risk: RiskLevel::Irreversible,
            confidence: 0.5,
        };
        let request = ApprovalRequest::new(run.id, action, 300);
        registry.suspend_for_approval(run.id, vec![request]);
        registry.approve(run.id, None).unwrap();
        let fetched = registry.get_run(run.id).unwrap();
        assert_eq!(fetched.status, RunStatus::Running);
    }
}

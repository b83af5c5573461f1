//! The `Run` entity: the unit of work tracked by the run registry, from
//! submission through completion, suspension, or escalation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::research::{ApprovalRequest, ResearchState, ToolCallRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    SuspendedApproval,
    Completed,
    Failed,
    Escalated,
}

impl RunStatus {
    /// Whether a run in this status can still make progress (as opposed
    /// to being in one of the three terminal states).
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Escalated)
    }
}

/// A single research run tracked end-to-end by the run registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub status: RunStatus,
    pub query: String,
    pub state: ResearchState,
    #[serde(default)]
    pub tool_log: Vec<ToolCallRecord>,
    /// Pending approvals in creation order; `approve`/`reject` always
    /// resolve the front of this queue.
    #[serde(default)]
    pub pending_approvals: Vec<ApprovalRequest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Run {
    pub fn new(query: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let query = query.into();
        let now = Utc::now();
        Self {
            id,
            status: RunStatus::Queued,
            state: ResearchState::new(id, query.clone()),
            query,
            tool_log: Vec::new(),
            pending_approvals: Vec::new(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_queued() {
        let run = Run::new("what is the capital of France?");
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.tool_log.is_empty());
        assert!(run.pending_approvals.is_empty());
    }

    #[test]
    fn terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Escalated.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::SuspendedApproval.is_terminal());
    }
}

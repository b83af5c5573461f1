//! A concrete, in-process [`SuspendForApproval`] implementation: a
//! `tokio::sync::oneshot` channel per pending request, registered in a
//! shared map so an external caller (the HTTP layer's
//! `approve`/`reject` handlers) can resolve it later, and a
//! `tokio::time::timeout` wrapper honoring the ~5 minute contract in
//! spec §3.
//!
//! This stands in for whatever the host runtime actually provides
//! (Slack, email, a dashboard, Windmill's `wmill.suspend()`) — spec §9
//! explicitly asks for the capability to be host-agnostic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use fathom_domain::ports::{ResumeDecision, SuspendForApproval};
use fathom_domain::research::ApprovalRequest;

/// Shared table of in-flight approvals, keyed by `ApprovalRequest::id`.
/// A caller resolves one with [`InProcessSuspender::resolve`]; anyone
/// still waiting when the timeout elapses gets
/// `ResumeDecision::Escalate` instead of hanging forever.
#[derive(Default)]
pub struct InProcessSuspender {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<ResumeDecision>>>,
}

impl InProcessSuspender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resolve a pending approval. Returns `false` if nothing is waiting
    /// on `approval_id` (already resolved, already timed out, or never
    /// registered) — callers surface that as `NoPendingApproval`.
    pub fn resolve(&self, approval_id: Uuid, decision: ResumeDecision) -> bool {
        let sender = self.pending.lock().remove(&approval_id);
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl SuspendForApproval for InProcessSuspender {
    async fn suspend(&self, request: &ApprovalRequest) -> ResumeDecision {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request.id, tx);

        let timeout_secs = (request.timeout_at - request.requested_at).num_seconds().max(1) as u64;
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), rx).await;

        // Whether we timed out or the channel was dropped, make sure the
        // entry doesn't linger in the map forever.
        self.pending.lock().remove(&request.id);

        match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) | Err(_) => ResumeDecision::Escalate { reason: "approval_timeout".to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_domain::research::{PlannedAction, RiskLevel};

    fn request() -> ApprovalRequest {
        let action = PlannedAction {
            tool_name: "send_email".to_string(),
            parameters: serde_json::json!({}),
            risk: RiskLevel::ReversibleWithDelay,
            confidence: 0.5,
        };
        ApprovalRequest::new(Uuid::new_v4(), action, 300)
    }

    #[tokio::test]
    async fn resolve_before_timeout_delivers_decision() {
        let suspender = InProcessSuspender::new();
        let request = request();
        let request_id = request.id;

        let suspender2 = suspender.clone();
        let handle = tokio::spawn(async move { suspender2.suspend(&request).await });

        // give the spawned suspend a moment to register its sender
        tokio::task::yield_now().await;
        assert!(suspender.resolve(request_id, ResumeDecision::Approve { approver: Some("alice".into()) }));

        let decision = handle.await.unwrap();
        assert!(matches!(decision, ResumeDecision::Approve { approver } if approver.as_deref() == Some("alice")));
    }

    #[tokio::test]
    async fn resolve_with_unknown_id_returns_false() {
        let suspender = InProcessSuspender::new();
        assert!(!suspender.resolve(Uuid::new_v4(), ResumeDecision::Approve { approver: None }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_escalates() {
        let suspender = InProcessSuspender::new();
        let mut request = request();
        request.timeout_at = request.requested_at + chrono::Duration::seconds(1);

        let decision = suspender.suspend(&request).await;
        assert!(matches!(decision, ResumeDecision::Escalate { reason } if reason == "approval_timeout"));
        assert_eq!(suspender.pending_count(), 0);
    }
}

use serde::Serialize;

/// Structured trace events emitted across every crate in the workspace.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunCreated {
        run_id: uuid::Uuid,
        user_id: String,
        topic: String,
    },
    RunStatusChanged {
        run_id: uuid::Uuid,
        from: String,
        to: String,
    },
    ToolCallRecorded {
        run_id: uuid::Uuid,
        tool_name: String,
        cache_hit: bool,
        duration_ms: u64,
    },
    ApprovalRequested {
        run_id: uuid::Uuid,
        approval_id: uuid::Uuid,
        tool_name: String,
        risk: String,
    },
    ApprovalResolved {
        run_id: uuid::Uuid,
        approval_id: uuid::Uuid,
        status: String,
    },
    WorkflowNodeCompleted {
        run_id: uuid::Uuid,
        node: String,
        iteration: u32,
    },
    ToolGapDetected {
        run_id: uuid::Uuid,
        missing_capabilities: usize,
    },
    SerialMemoryCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fathom_event");
    }
}

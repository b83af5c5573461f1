//! The research-agent data model: the state threaded through the workflow
//! graph, and the records produced along the way (sources, planned actions,
//! tool calls, approvals).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The value threaded through every workflow node. Each node receives a
/// `ResearchState` by value and returns a new one — there is no in-place
/// mutation, so a node's effect on the run is always exactly its return
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub run_id: Uuid,
    pub query: String,
    /// Opaque identifier of the requester. UUID semantics, not enforced.
    #[serde(default)]
    pub user_id: String,
    /// Current status, advanced only by node transitions.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// The current research plan, one sentence per step.
    #[serde(default)]
    pub plan: Vec<String>,
    /// Sources discovered so far, in discovery order.
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    /// The draft findings produced by the Research node.
    #[serde(default)]
    pub findings: String,
    /// Critique notes from the most recent Critique pass.
    #[serde(default)]
    pub critique_notes: Vec<String>,
    /// Heuristic quality score in `[0.0, 1.0]`, monotonically
    /// non-decreasing across Critique passes.
    #[serde(default)]
    pub quality_score: f64,
    /// Minimum `quality_score` the Critique node accepts without Refine.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    /// The model's self-reported confidence for the current findings.
    #[serde(default)]
    pub confidence: f64,
    /// Number of Critique→Refine round trips taken so far.
    #[serde(default)]
    pub iteration_count: u32,
    /// Upper bound on `iteration_count`, clamped to `[1, 5]` at construction.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Actions the agent proposed that must clear the approval gate
    /// before Finish.
    #[serde(default)]
    pub planned_actions: Vec<PlannedAction>,
    /// Set when Research hits `RuntimeBudgetExceeded` instead of
    /// completing normally.
    #[serde(default)]
    pub timed_out: bool,
    /// The finished markdown report, set by the Finish node.
    #[serde(default)]
    pub report: Option<String>,
    /// Same content as `report`, named to match the external report
    /// contract in spec §4.4's Finish node.
    #[serde(default)]
    pub report_markdown: Option<String>,
    /// Id of the report document in the `MemoryStore`, if storage
    /// succeeded. A storage failure is non-fatal and leaves this `None`.
    #[serde(default)]
    pub memory_document_id: Option<String>,
}

fn default_quality_threshold() -> f64 {
    0.8
}

fn default_max_iterations() -> u32 {
    3
}

/// The five-node workflow's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Planning,
    Researching,
    Critiquing,
    Refining,
    Finished,
}

impl ResearchState {
    pub fn new(run_id: Uuid, query: impl Into<String>) -> Self {
        Self {
            run_id,
            query: query.into(),
            user_id: String::new(),
            status: WorkflowStatus::Planning,
            plan: Vec::new(),
            sources: Vec::new(),
            findings: String::new(),
            critique_notes: Vec::new(),
            quality_score: 0.0,
            quality_threshold: default_quality_threshold(),
            confidence: 0.0,
            iteration_count: 0,
            max_iterations: default_max_iterations(),
            planned_actions: Vec::new(),
            timed_out: false,
            report: None,
            report_markdown: None,
            memory_document_id: None,
        }
    }

    /// Clamp `max_iterations` to the documented `[1, 5]` range. Input
    /// above 5 (spec boundary case: `6` clamps to `5`) never reaches the
    /// Critique node's comparison unclamped.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.clamp(1, 5);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    /// Apply the quality-score heuristic used by the Critique node:
    /// `max(previous, min(1.0, 0.3 * |sources|), confidence)`.
    ///
    /// This is explicitly a heuristic, not a formal scoring model — it
    /// rewards both source breadth and the model's own confidence, and
    /// never regresses a score that was already reached.
    pub fn with_quality_score_updated(mut self) -> Self {
        let source_component = (0.3 * self.sources.len() as f64).min(1.0);
        self.quality_score = self.quality_score.max(source_component).max(self.confidence);
        self
    }

    pub fn with_plan(mut self, plan: Vec<String>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_sources_appended(mut self, mut new_sources: Vec<SourceReference>) -> Self {
        self.sources.append(&mut new_sources);
        self
    }

    pub fn with_findings(mut self, findings: impl Into<String>) -> Self {
        self.findings = findings.into();
        self
    }

    pub fn with_critique(mut self, notes: Vec<String>, confidence: f64) -> Self {
        self.critique_notes = notes;
        self.confidence = confidence;
        self
    }

    pub fn with_iteration_incremented(mut self) -> Self {
        self.iteration_count += 1;
        self
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        let rendered = report.into();
        self.report_markdown = Some(rendered.clone());
        self.report = Some(rendered);
        self
    }

    pub fn with_memory_document_id(mut self, id: impl Into<String>) -> Self {
        self.memory_document_id = Some(id.into());
        self
    }

    pub fn with_planned_actions(mut self, actions: Vec<PlannedAction>) -> Self {
        self.planned_actions = actions;
        self
    }

    pub fn with_timed_out(mut self, findings: impl Into<String>) -> Self {
        self.timed_out = true;
        self.findings = findings.into();
        self.status = WorkflowStatus::Finished;
        self
    }

    pub fn has_enough_sources(&self) -> bool {
        self.sources.len() >= 3
    }

    pub fn meets_quality(&self) -> bool {
        self.quality_score >= self.quality_threshold
    }
}

/// A source discovered during research. Preserves discovery order so a
/// rendered report can cite sources in the order they were found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceReference {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub retrieved_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Risk classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How hard a tool call's effects are to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Fully reversible: reads, searches, in-memory computations.
    Reversible,
    /// Reversible, but only after some delay or manual cleanup (e.g. a
    /// scheduled post, a draft that auto-publishes).
    ReversibleWithDelay,
    /// Cannot be undone once executed (e.g. sending an email, deleting
    /// data, an irreversible external side effect).
    Irreversible,
}

/// A tool call the agent intends to make, classified by risk before
/// dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub tool_name: String,
    pub parameters: serde_json::Value,
    pub risk: RiskLevel,
    /// `true` when the risk classifier's confidence in `risk` is below the
    /// threshold that allows auto-approval — low confidence always routes
    /// to the approval gate regardless of `risk`.
    pub confidence: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    /// A decision could not be classified as approve/reject (unknown
    /// string, malformed payload, or the approval timeout elapsed) — the
    /// run is escalated to a human rather than guessed at.
    Escalated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub run_id: Uuid,
    pub action: PlannedAction,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    /// `requested_at + timeout_secs`. Invariant: `|timeout_at -
    /// requested_at| ∈ [290s, 310s]` for the default 300s contract.
    pub timeout_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision_note: Option<String>,
}

impl ApprovalRequest {
    /// `timeout_secs` is the approval gate's configured timeout (default
    /// 300s, clamped to `[1, 900]` by `ApprovalConfig`).
    pub fn new(run_id: Uuid, action: PlannedAction, timeout_secs: u64) -> Self {
        let requested_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            run_id,
            action,
            status: ApprovalStatus::Pending,
            requested_at,
            timeout_at: requested_at + chrono::Duration::seconds(timeout_secs as i64),
            resolved_at: None,
            decision_note: None,
        }
    }

    pub fn resolve(mut self, status: ApprovalStatus, decision_note: Option<String>) -> Self {
        self.status = status;
        self.resolved_at = Some(Utc::now());
        self.decision_note = decision_note;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool call records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Failed,
    Timeout,
}

/// One entry in a run's tool log. The engine never exceeds
/// `AgentConfig::max_tool_calls` entries per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub status: ToolCallStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent turn output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The normalized shape of one raw LLM reply within a turn: either the
/// model wants to call more tools, or it has produced a final answer.
/// This is an intermediate value the engine consumes while driving the
/// tool-call loop — the turn's actual result is an [`AgentResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmTurnOutput {
    ToolCalls { calls: Vec<PlannedAction> },
    Final { content: String, confidence: f64 },
}

/// The result of one complete agent turn, handed back to the workflow.
/// `tool_calls` is always the authoritative C1 log, never the model's
/// self-reported call list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub confidence: f64,
    /// Side-effecting tool calls the model proposed but C1 declined to
    /// dispatch because the risk classifier required approval first —
    /// handed to C5 at Finish rather than executed inline.
    #[serde(default)]
    pub planned_actions: Vec<PlannedAction>,
}

impl AgentResponse {
    /// A degraded response for the cases C2 must never let escape as a
    /// panic or propagated error: budget/loop/deadline caps and
    /// malformed LLM output. Confidence is always 0.0.
    pub fn degraded(reasoning: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            answer: String::new(),
            reasoning: reasoning.into(),
            tool_calls,
            confidence: 0.0,
            planned_actions: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool gap detector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The outcome of a pre-flight capability check: does the currently
/// available toolset cover what this query will need?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolGapReport {
    pub missing_tools: Vec<String>,
    pub attempted_task: String,
    pub existing_tools_checked: Vec<String>,
    pub reasoning: String,
}

impl ToolGapReport {
    pub fn has_gaps(&self) -> bool {
        !self.missing_tools.is_empty()
    }
}

//! Capability interfaces the core consumes but never fully owns: the
//! `LLM`, `ToolServer`, `MemoryStore`, `ActionExecutor`, and
//! `SuspendForApproval` boundaries from spec §6. Living here (rather than
//! in the crate that happens to implement one of them) lets every adapter
//! crate (`fathom-mcp`, `fathom-memory`, `fathom-approval`) and every test
//! double implement the same trait without a dependency cycle.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::research::{ApprovalRequest, PlannedAction};
use crate::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One content block of a tool result, normalized away from whatever
/// duck-typed shape the underlying provider used.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub text_blocks: Vec<String>,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { text_blocks: vec![text.into()], is_error: false }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { text_blocks: vec![text.into()], is_error: true }
    }

    /// Join every text block into one displayable string — the single
    /// method the core ever calls on a tool result.
    pub fn text(&self) -> String {
        self.text_blocks.join("\n")
    }
}

/// The MCP-style tool host: discoverable tools plus dispatch. Spec §6.
#[async_trait]
pub trait ToolServer: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A document returned from a semantic search over the memory store.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    pub id: String,
    pub content: String,
    pub score: f64,
    #[allow(dead_code)]
    pub metadata: Value,
}

/// One turn of a stored conversation transcript.
#[derive(Debug, Clone)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

/// The long-term memory capability. Spec §1 treats the storage layer
/// itself as out of scope; the core only ever sees these four operations.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store_document(&self, content: &str, metadata: Value) -> Result<String>;
    async fn semantic_search(&self, query: &str, top_k: usize) -> Result<Vec<MemoryDocument>>;
    async fn store_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<()>;
    async fn get_conversation_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryMessage>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval gate capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Executes a `PlannedAction` that has cleared the approval gate (either
/// because it was reversible, or because a human approved it).
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &PlannedAction) -> Result<Value>;
}

/// The caller's resume payload, interpreted per spec §4.5.
#[derive(Debug, Clone)]
pub enum ResumeDecision {
    Approve { approver: Option<String> },
    Reject { rejector: Option<String>, comment: Option<String> },
    Escalate { reason: String },
}

/// Suspends a run pending a human decision, honoring the ~5 minute
/// timeout contract in spec §3. Implementations that time out must
/// resolve to `ResumeDecision::Escalate`, never hang indefinitely.
#[async_trait]
pub trait SuspendForApproval: Send + Sync {
    async fn suspend(&self, request: &ApprovalRequest) -> ResumeDecision;
}

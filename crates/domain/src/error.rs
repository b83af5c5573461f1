/// Shared infrastructure error type used across every crate: transport,
/// serialization, and capability-adapter failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("memory store: {0}")]
    MemoryStore(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the agent execution engine, the workflow graph, and the
/// approval gate. Every member corresponds to a documented failure mode of a
/// run rather than an infrastructure fault — the engine catches these and
/// degrades them into an `AgentResponse` where possible instead of letting
/// them propagate as a crashed run.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// The tool-call budget for this run (`AgentConfig::max_tool_calls`)
    /// was exhausted.
    #[error("tool call budget exceeded: {limit} calls")]
    BudgetExceeded { limit: usize },

    /// The same (tool_name, arguments) pair was issued `repeats` times in a
    /// row, tripping the loop guard.
    #[error("loop detected: {tool_name} repeated {repeats} times consecutively")]
    LoopDetected { tool_name: String, repeats: usize },

    /// The run's wall-clock deadline elapsed.
    #[error("run exceeded its wall-clock budget of {limit_secs}s")]
    RuntimeBudgetExceeded { limit_secs: u64 },

    /// A tool call did not complete within its configured timeout.
    #[error("tool '{tool_name}' timed out after {timeout_secs}s")]
    ToolTimeout { tool_name: String, timeout_secs: u64 },

    /// A tool call returned an error result.
    #[error("tool '{tool_name}' failed: {message}")]
    ToolFailure { tool_name: String, message: String },

    /// The LLM's output could not be normalized into a known shape
    /// (neither a tool call nor a final structured response).
    #[error("malformed LLM output: {0}")]
    MalformedLlmOutput(String),

    /// A side-effect guard rejected a call (e.g. a second `search_memory`
    /// attempt within the same turn, or a duplicate `store_memory` write).
    #[error("guard violation: {0}")]
    GuardViolation(String),

    /// An approval decision was submitted for a run with no pending
    /// approval request.
    #[error("no pending approval for run {run_id}")]
    NoPendingApproval { run_id: uuid::Uuid },

    /// An operation was attempted on a run that is not in the required
    /// lifecycle state.
    #[error("run {run_id} is not ready: {reason}")]
    NotReady { run_id: uuid::Uuid, reason: String },

    /// The tool gap detector's capability analysis could not be completed
    /// (fail-closed: the run is aborted rather than proceeding blind).
    #[error("capability gap detection failed: {0}")]
    CapabilityGapDetection(String),

    /// An underlying infrastructure error (LLM, MemoryStore, ToolServer).
    #[error(transparent)]
    Infra(#[from] Error),
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;

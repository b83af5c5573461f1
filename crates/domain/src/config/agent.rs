use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent execution limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounds enforced by the agent execution engine on a single run.
///
/// `max_tool_calls` and `max_identical_repeats` are absolute safety caps
/// (not user-tunable beyond config) — everything else is clamped to the
/// documented range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on tool calls recorded in a single run's tool log.
    #[serde(default = "d_max_tool_calls")]
    pub max_tool_calls: usize,
    /// Number of consecutive identical (tool_name, arguments) calls that
    /// trips the loop guard.
    #[serde(default = "d_max_identical_repeats")]
    pub max_identical_repeats: usize,
    /// Per-tool-call timeout in seconds. Clamped to `[1, 120]`.
    #[serde(default = "d_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Wall-clock budget for an entire run, in seconds.
    #[serde(default = "d_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Substrings that, when found in a `store_memory` call's content or
    /// metadata values, reject the call as low-value telemetry.
    #[serde(default = "d_store_memory_reject_substrings")]
    pub store_memory_reject_substrings: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: d_max_tool_calls(),
            max_identical_repeats: d_max_identical_repeats(),
            tool_timeout_secs: d_tool_timeout_secs(),
            run_timeout_secs: d_run_timeout_secs(),
            store_memory_reject_substrings: d_store_memory_reject_substrings(),
        }
    }
}

impl AgentConfig {
    /// Clamp the tunable bounds to their documented ranges. The two
    /// absolute caps (`max_tool_calls`, `max_identical_repeats`) are left
    /// untouched — they are safety ceilings, not user preferences.
    pub fn clamped(&self) -> Self {
        Self {
            tool_timeout_secs: self.tool_timeout_secs.clamp(1, 120),
            ..self.clone()
        }
    }
}

fn d_max_tool_calls() -> usize {
    50
}
fn d_max_identical_repeats() -> usize {
    3
}
fn d_tool_timeout_secs() -> u64 {
    30
}
fn d_run_timeout_secs() -> u64 {
    600
}
fn d_store_memory_reject_substrings() -> Vec<String> {
    vec![
        "no results found".into(),
        "no_results".into(),
        "initial query".into(),
        "status:".into(),
        "query:".into(),
    ]
}

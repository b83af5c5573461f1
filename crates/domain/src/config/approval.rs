use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval gate configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings for the human-in-the-loop approval gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// How long a suspended run waits for a decision before escalating,
    /// in seconds. Clamped to `[1, 900]`.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_timeout_secs(),
        }
    }
}

impl ApprovalConfig {
    /// Clamp `timeout_secs` to `[1, 900]`.
    pub fn clamped(&self) -> Self {
        Self {
            timeout_secs: self.timeout_secs.clamp(1, 900),
        }
    }
}

fn d_timeout_secs() -> u64 {
    300
}

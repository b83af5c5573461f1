use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research workflow configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings for the Plan → Research → Critique → Refine → Finish graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum Critique→Refine round trips before forcing Finish. Clamped
    /// to `[1, 5]`.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Minimum quality score the Critique node requires to advance to
    /// Finish instead of looping back to Refine.
    #[serde(default = "d_quality_threshold")]
    pub quality_threshold: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            quality_threshold: d_quality_threshold(),
        }
    }
}

impl WorkflowConfig {
    /// Clamp `max_iterations` to `[1, 5]`.
    pub fn clamped(&self) -> Self {
        Self {
            max_iterations: self.max_iterations.clamp(1, 5),
            ..self.clone()
        }
    }
}

fn d_max_iterations() -> u32 {
    3
}
fn d_quality_threshold() -> f64 {
    0.8
}

//! C4 — the research workflow state machine: `Plan → Research → Critique
//! → (Refine → Research)* → Finish`.
//!
//! The executor in this module is deliberately thin: the interesting
//! logic lives in the pure node functions (`nodes`), this just drives
//! them in the order spec §4.4 describes and stops on either a finished
//! state or a tool-gap short-circuit.

pub mod nodes;
pub mod report;

use fathom_domain::config::AgentConfig;
use fathom_domain::ports::{MemoryStore, ToolServer};
use fathom_domain::research::{ResearchState, ToolGapReport};
use fathom_providers::traits::LlmProvider;

use nodes::CritiqueEdge;

/// What a complete workflow run produced.
pub enum WorkflowOutcome {
    Completed(ResearchState),
    GapReport(ToolGapReport),
}

pub struct WorkflowDeps<'a> {
    pub tool_server: &'a dyn ToolServer,
    pub memory: &'a dyn MemoryStore,
    pub llm: &'a dyn LlmProvider,
    pub agent_config: &'a AgentConfig,
    pub max_runtime_seconds: Option<u64>,
}

/// Drive the graph to completion from `Plan`. Bounded by construction:
/// `max_iterations <= 5` caps the number of Research invocations.
pub async fn run_workflow(initial: ResearchState, deps: &WorkflowDeps<'_>) -> WorkflowOutcome {
    let mut state = nodes::plan(initial);

    loop {
        state = match nodes::research(
            state,
            deps.tool_server,
            deps.memory,
            deps.llm,
            deps.agent_config,
            deps.max_runtime_seconds,
        )
        .await
        {
            Ok(state) => state,
            Err(report) => return WorkflowOutcome::GapReport(report),
        };

        if state.timed_out {
            let state = nodes::finish(state, Some(deps.memory)).await;
            return WorkflowOutcome::Completed(state);
        }

        state = nodes::critique(state);

        match nodes::critique_edge(&state) {
            CritiqueEdge::Finish => {
                let state = nodes::finish(state, Some(deps.memory)).await;
                return WorkflowOutcome::Completed(state);
            }
            CritiqueEdge::Refine => {
                state = nodes::refine(state);
            }
        }
    }
}

//! The `fathom` binary crate: HTTP glue over the run registry, wiring the
//! `LLM`, `ToolServer`, `MemoryStore`, and approval-suspension capabilities
//! into the workflow and approval gate built in the library crates.
//!
//! Everything interesting lives in `fathom-domain`/`fathom-agent`/
//! `fathom-workflow`/`fathom-approval`/`fathom-runs`; this crate only
//! assembles concrete adapters, drives the HTTP surface, and spawns the
//! background task per run.

pub mod api;
pub mod orchestrator;
pub mod telemetry;

use std::sync::Arc;

use fathom_domain::config::Config;
use fathom_domain::ports::{ActionExecutor, MemoryStore, ToolServer};
use fathom_providers::traits::LlmProvider;
use fathom_runs::RunRegistry;

use orchestrator::RegistryTrackingSuspender;

/// Shared application state passed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RunRegistry>,
    pub tool_server: Arc<dyn ToolServer>,
    pub memory: Arc<dyn MemoryStore>,
    /// `None` when no provider is configured and `llm.startup_policy` is
    /// `AllowNone` — requests that would need the model are rejected at
    /// the HTTP boundary rather than panicking deep in the workflow.
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub executor: Arc<dyn ActionExecutor>,
    /// Resolves a pending approval's oneshot channel directly — used by
    /// the approve/reject handlers.
    pub suspender: Arc<fathom_approval::InProcessSuspender>,
    /// The `SuspendForApproval` the approval gate actually calls; wraps
    /// `suspender` with run-registry bookkeeping and trace events.
    pub approval_suspender: Arc<RegistryTrackingSuspender>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        registry: Arc<RunRegistry>,
        tool_server: Arc<dyn ToolServer>,
        memory: Arc<dyn MemoryStore>,
        llm: Option<Arc<dyn LlmProvider>>,
        executor: Arc<dyn ActionExecutor>,
        suspender: Arc<fathom_approval::InProcessSuspender>,
    ) -> Self {
        let approval_suspender = Arc::new(RegistryTrackingSuspender::new(registry.clone(), suspender.clone()));
        Self { config, registry, tool_server, memory, llm, executor, suspender, approval_suspender }
    }
}

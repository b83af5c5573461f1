use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use fathom_domain::config::{Config, ConfigSeverity, CorsConfig, LlmStartupPolicy};
use fathom_domain::ports::{MemoryStore, ToolServer};
use fathom_runs::RunRegistry;

use fathom::api;
use fathom::orchestrator::ToolServerExecutor;
use fathom::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let config = Config::load_or_default(&config_path).clamped();

    fathom::telemetry::init(&config.observability);
    tracing::info!("fathom starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }
    let config = Arc::new(config);

    // ── LLM provider ─────────────────────────────────────────────────
    let llm = match config.llm.providers.first() {
        Some(provider_config) => match fathom_providers::create_provider(provider_config) {
            Ok(provider) => {
                tracing::info!(provider_id = %provider_config.id, "LLM provider ready");
                Some(provider)
            }
            Err(err) if config.llm.startup_policy == LlmStartupPolicy::RequireOne => {
                return Err(err).context("initializing required LLM provider");
            }
            Err(err) => {
                tracing::warn!(error = %err, "LLM provider initialization failed; continuing without one");
                None
            }
        },
        None if config.llm.startup_policy == LlmStartupPolicy::RequireOne => {
            anyhow::bail!("llm.startup_policy is require_one but no [[llm.providers]] are configured");
        }
        None => {
            tracing::warn!("no LLM providers configured — POST /runs will return 503 until one is added");
            None
        }
    };

    // ── MemoryStore ──────────────────────────────────────────────────
    let memory_provider = fathom_memory::create_provider(&config.memory).context("creating memory store client")?;
    let memory: Arc<dyn MemoryStore> = Arc::new(fathom_memory::SerialMemoryStore::new(memory_provider));
    tracing::info!(url = %config.memory.base_url, "memory store client ready");

    // ── ToolServer (MCP) ─────────────────────────────────────────────
    let mcp_servers = config.mcp.effective_servers();
    let tool_server: Arc<dyn ToolServer> = if mcp_servers.is_empty() {
        tracing::info!("no MCP servers configured");
        Arc::new(fathom_mcp::McpManager::empty())
    } else {
        tracing::info!(count = mcp_servers.len(), "initializing MCP servers");
        Arc::new(fathom_mcp::McpManager::from_config(&config.mcp).await)
    };

    // ── Run registry + approval plumbing ─────────────────────────────
    let registry = RunRegistry::new();
    let suspender = fathom_approval::InProcessSuspender::new();
    let executor: Arc<dyn fathom_domain::ports::ActionExecutor> = Arc::new(ToolServerExecutor::new(tool_server.clone()));

    let state = AppState::new(config.clone(), registry, tool_server, memory, llm, executor, suspender);

    // ── Router ───────────────────────────────────────────────────────
    let cors = build_cors_layer(&config.server.cors);
    let app = api::router().layer(cors).layer(TraceLayer::new_for_http()).with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, "fathom listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. Origins may
/// carry a trailing `*` wildcard for the port segment (e.g.
/// `http://localhost:*`).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

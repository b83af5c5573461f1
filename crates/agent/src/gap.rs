//! C7 — the Tool Gap Detector.
//!
//! Runs once, before the research workflow starts: asks the LLM whether
//! the registered tool set can plausibly cover the task. Failing to
//! parse the LLM's answer must never block a legitimate query, so a
//! parse failure is logged and swallowed rather than propagated.

use fathom_domain::ports::ToolServer;
use fathom_domain::research::ToolGapReport;
use fathom_domain::tool::{Message, ToolDefinition};
use fathom_providers::traits::{ChatRequest, LlmProvider};

/// Article-fetcher style tools that are noisy in a gap-detection prompt
/// and never load-bearing for "can we do this task" reasoning.
const EXCLUDED_TOOL_SUBSTRINGS: &[&str] = &["fetch_article", "read_article", "article_fetch"];

/// Tools assumed to exist regardless of what the `ToolServer` reports —
/// the core always wires these in itself.
const CORE_MEMORY_TOOLS: &[(&str, &str)] = &[
    ("search_memory", "Search the long-term memory store for relevant prior context."),
    ("store_memory", "Persist a finding or answer to the long-term memory store."),
];

pub async fn detect_gaps(
    task: &str,
    tool_server: &dyn ToolServer,
    llm: &dyn LlmProvider,
) -> Option<ToolGapReport> {
    let discovered = match tool_server.list_tools().await {
        Ok(tools) => tools,
        Err(err) => {
            tracing::warn!(error = %err, "tool gap detector: list_tools failed, proceeding without gap check");
            return None;
        }
    };

    let mut tools: Vec<ToolDefinition> = discovered
        .into_iter()
        .filter(|t| !EXCLUDED_TOOL_SUBSTRINGS.iter().any(|needle| t.name.contains(needle)))
        .collect();
    for (name, description) in CORE_MEMORY_TOOLS {
        if !tools.iter().any(|t| t.name == *name) {
            tools.push(ToolDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            });
        }
    }

    let checked: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();

    let tool_listing = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Task: {task}\n\n\
         Available tools:\n{tool_listing}\n\n\
         Decide whether these tools are sufficient to complete the task. \
         Respond with ONLY a JSON object of the form \
         {{\"missing_capabilities\": [\"...\"], \"reasoning\": \"...\"}}. \
         If the tools are sufficient, return an empty missing_capabilities array."
    );

    let request = ChatRequest {
        messages: vec![Message::user(prompt)],
        json_mode: true,
        ..Default::default()
    };

    let response = match llm.chat(request).await {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(error = %err, "tool gap detector: LLM call failed, proceeding without gap check");
            return None;
        }
    };

    match parse_gap_response(&response.content, task, checked) {
        Some(report) if report.has_gaps() => Some(report),
        Some(_) => None,
        None => {
            tracing::warn!("tool gap detector: could not parse LLM output, proceeding without gap check");
            None
        }
    }
}

fn parse_gap_response(content: &str, task: &str, existing_tools_checked: Vec<String>) -> Option<ToolGapReport> {
    let value: serde_json::Value = serde_json::from_str(content.trim()).ok()?;
    let missing_tools = value
        .get("missing_capabilities")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let reasoning = value.get("reasoning").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    Some(ToolGapReport { missing_tools, attempted_task: task.to_string(), existing_tools_checked, reasoning })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked() -> Vec<String> {
        vec!["web_search".into(), "read_file".into(), "get_current_time".into(), "search_memory".into()]
    }

    #[test]
    fn parses_well_formed_gap_response() {
        let raw = r#"{"missing_capabilities": ["financial_data_api", "account_access"], "reasoning": "no portfolio tool"}"#;
        let report = parse_gap_response(raw, "Retrieve my stock portfolio performance for Q3 2024", checked()).unwrap();
        assert_eq!(report.missing_tools, vec!["financial_data_api", "account_access"]);
        assert_eq!(report.existing_tools_checked, checked());
        assert_eq!(report.attempted_task, "Retrieve my stock portfolio performance for Q3 2024");
        assert!(report.has_gaps());
    }

    #[test]
    fn empty_missing_capabilities_has_no_gaps() {
        let raw = r#"{"missing_capabilities": [], "reasoning": "sufficient"}"#;
        let report = parse_gap_response(raw, "task", checked()).unwrap();
        assert!(!report.has_gaps());
    }

    #[test]
    fn malformed_json_fails_closed_to_none() {
        assert!(parse_gap_response("not json at all", "task", checked()).is_none());
    }
}

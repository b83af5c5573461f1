//! Bridges the two capability traits the engine actually calls tools
//! through (`ToolServer`, `MemoryStore`) into the single-name dispatch
//! surface `RunContext::dispatch` expects.

use fathom_domain::ports::{MemoryStore, ToolServer};
use serde_json::Value;

pub struct AgentCapabilities<'a> {
    pub tool_server: &'a dyn ToolServer,
    pub memory: &'a dyn MemoryStore,
}

impl<'a> AgentCapabilities<'a> {
    pub fn new(tool_server: &'a dyn ToolServer, memory: &'a dyn MemoryStore) -> Self {
        Self { tool_server, memory }
    }

    /// Route a named tool call to whichever capability owns it. The two
    /// memory verbs are handled here directly; everything else goes to
    /// the MCP-style `ToolServer`.
    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> Result<Value, String> {
        match tool_name {
            "search_memory" => {
                let query = arguments.get("query").and_then(|v| v.as_str()).unwrap_or_default();
                let top_k = arguments.get("top_k").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
                let hits = self
                    .memory
                    .semantic_search(query, top_k)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({
                    "results": hits.iter().map(|h| serde_json::json!({
                        "id": h.id,
                        "content": h.content,
                        "score": h.score,
                    })).collect::<Vec<_>>(),
                }))
            }
            "store_memory" => {
                let content = arguments.get("content").and_then(|v| v.as_str()).unwrap_or_default();
                let metadata = arguments.get("metadata").cloned().unwrap_or(Value::Null);
                let id = self
                    .memory
                    .store_document(content, metadata)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({"id": id}))
            }
            other => {
                let outcome = self
                    .tool_server
                    .call_tool(other, arguments)
                    .await
                    .map_err(|e| e.to_string())?;
                if outcome.is_error {
                    Err(outcome.text())
                } else {
                    Ok(serde_json::json!(sanitize_output(&outcome.text())))
                }
            }
        }
    }
}

/// Strip control characters and cap length, per spec §6's `ToolServer`
/// contract. The truncation marker makes it obvious to the model (and a
/// human reading the log) that the text was cut, not merely short.
const MAX_TOOL_OUTPUT_CHARS: usize = 8_000;

fn sanitize_output(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control() || *c == '\n' || *c == '\t').collect();
    if cleaned.chars().count() > MAX_TOOL_OUTPUT_CHARS {
        let truncated: String = cleaned.chars().take(MAX_TOOL_OUTPUT_CHARS).collect();
        format!("{truncated}\n...[truncated, {} chars total]", cleaned.chars().count())
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_chars() {
        let raw = "hello\u{0007}world\n\ttab";
        let cleaned = sanitize_output(raw);
        assert_eq!(cleaned, "helloworld\n\ttab");
    }

    #[test]
    fn sanitize_truncates_long_output() {
        let raw = "a".repeat(MAX_TOOL_OUTPUT_CHARS + 100);
        let cleaned = sanitize_output(&raw);
        assert!(cleaned.contains("[truncated"));
        assert!(cleaned.len() < raw.len());
    }
}

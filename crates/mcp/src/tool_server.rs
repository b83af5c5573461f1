//! Bridges [`McpManager`] into the core's `ToolServer` capability
//! interface (`fathom_domain::ports`), resolving the bare tool names the
//! agent engine deals in to the `(server_id, tool_name)` pair
//! `McpManager::call_tool` actually requires.

use async_trait::async_trait;
use serde_json::Value;

use fathom_domain::error::{Error, Result};
use fathom_domain::ports::{ToolOutcome, ToolServer};
use fathom_domain::tool::ToolDefinition;

use crate::manager::McpManager;

#[async_trait]
impl ToolServer for McpManager {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self
            .list_tools()
            .into_iter()
            .map(|(_server_id, def)| ToolDefinition {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.input_schema.clone(),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome> {
        let server_id = self
            .list_tools()
            .into_iter()
            .find(|(_, def)| def.name == name)
            .map(|(server_id, _)| server_id.to_string())
            .ok_or_else(|| Error::Other(format!("no MCP server exposes tool \"{name}\"")))?;

        let result = McpManager::call_tool(self, &server_id, name, arguments).await?;
        let text_blocks: Vec<String> = result.content.into_iter().map(|c| c.text).collect();
        Ok(ToolOutcome { text_blocks, is_error: result.is_error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_tool_errors_cleanly_when_no_server_exposes_it() {
        let manager = McpManager::empty();
        let result = ToolServer::call_tool(&manager, "nonexistent_tool", Value::Null).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_tools_is_empty_for_a_manager_with_no_servers() {
        let manager = McpManager::empty();
        let tools = ToolServer::list_tools(&manager).await.unwrap();
        assert!(tools.is_empty());
    }
}

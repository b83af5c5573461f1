//! MCP (Model Context Protocol) configuration types for the domain layer.
//!
//! These are lightweight config structs used to deserialize the `[mcp]`
//! section of the gateway config. The actual MCP client logic lives in
//! the `fathom-mcp` crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// List of MCP server definitions.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,

    /// Built-in presets that can be toggled on/off.
    /// When enabled, a preset injects a server entry automatically.
    #[serde(default)]
    pub presets: McpPresets,
}

impl McpConfig {
    /// Return the effective server list: explicit servers + enabled presets.
    pub fn effective_servers(&self) -> Vec<McpServerConfig> {
        let mut servers = self.servers.clone();

        if self.presets.web_search.enabled {
            servers.push(McpServerConfig {
                id: "web_search".into(),
                command: self.presets.web_search.command.clone()
                    .unwrap_or_else(|| "npx".into()),
                args: self.presets.web_search.args.clone()
                    .unwrap_or_else(|| vec!["-y".into(), "open-websearch@latest".into()]),
                transport: McpTransportKind::Stdio,
                url: None,
                env: HashMap::new(),
            });
        }

        if self.presets.time_context.enabled {
            servers.push(McpServerConfig {
                id: "time_context".into(),
                command: self.presets.time_context.command.clone()
                    .unwrap_or_else(|| "python3".into()),
                args: self.presets.time_context.args.clone()
                    .unwrap_or_else(|| vec!["-m".into(), "time_context_server".into()]),
                transport: McpTransportKind::Stdio,
                url: None,
                env: HashMap::new(),
            });
        }

        servers
    }
}

/// Built-in MCP server presets that can be toggled via config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpPresets {
    /// Web search, grounded on the original's open-websearch MCP server.
    #[serde(default)]
    pub web_search: McpPresetConfig,

    /// Deterministic clock/timezone tool, grounded on the original's
    /// `mcp-servers/time-context` server.
    #[serde(default)]
    pub time_context: McpPresetConfig,
}

/// Configuration for a single MCP preset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpPresetConfig {
    /// Whether this preset is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Override the default command for this preset.
    #[serde(default)]
    pub command: Option<String>,

    /// Override the default arguments for this preset.
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server (used in tool naming: `mcp:{id}:{tool}`).
    pub id: String,

    /// The command to spawn (e.g. `"npx"`).
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Transport type (`"stdio"` or `"sse"`).
    #[serde(default)]
    pub transport: McpTransportKind,

    /// Optional URL for SSE transport.
    #[serde(default)]
    pub url: Option<String>,

    /// Optional environment variables to set on the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

//! Bridges [`SerialMemoryProvider`] into the core's capability-interface
//! `MemoryStore` port (`fathom_domain::ports`), so `fathom-agent` and
//! `fathom-workflow` never depend on this crate's transport-specific types.

use async_trait::async_trait;
use serde_json::Value;

use fathom_domain::error::Result;
use fathom_domain::ports::{MemoryDocument, MemoryMessage, MemoryStore};

use crate::provider::SerialMemoryProvider;
use crate::types::{MemoryIngestRequest, RagSearchRequest};

/// Adapts any [`SerialMemoryProvider`] (REST or MCP) to the `MemoryStore`
/// port the agent engine and workflow nodes depend on.
pub struct SerialMemoryStore<P: SerialMemoryProvider + ?Sized> {
    provider: std::sync::Arc<P>,
}

impl<P: SerialMemoryProvider + ?Sized> SerialMemoryStore<P> {
    pub fn new(provider: std::sync::Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: SerialMemoryProvider + ?Sized> MemoryStore for SerialMemoryStore<P> {
    async fn store_document(&self, content: &str, metadata: Value) -> Result<String> {
        let response = self
            .provider
            .ingest(MemoryIngestRequest {
                content: content.to_string(),
                source: Some("fathom_workflow".to_string()),
                session_id: None,
                metadata: metadata.as_object().cloned(),
                extract_entities: Some(true),
            })
            .await?;
        Ok(response.memory_id)
    }

    async fn semantic_search(&self, query: &str, top_k: usize) -> Result<Vec<MemoryDocument>> {
        let response = self
            .provider
            .search(RagSearchRequest { query: query.to_string(), limit: Some(top_k as u32), ..Default::default() })
            .await?;
        Ok(response
            .memories
            .into_iter()
            .map(|m| MemoryDocument {
                id: m.id.unwrap_or_default(),
                content: m.content,
                score: m.similarity.unwrap_or(0.0),
                metadata: m
                    .metadata
                    .map(|map| Value::Object(map.into_iter().collect()))
                    .unwrap_or(Value::Null),
            })
            .collect())
    }

    async fn store_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<()> {
        self.provider
            .ingest(MemoryIngestRequest {
                content: content.to_string(),
                source: Some(format!("conversation:{role}")),
                session_id: Some(conversation_id.to_string()),
                metadata: None,
                extract_entities: Some(false),
            })
            .await?;
        Ok(())
    }

    /// SerialMemory has no dedicated transcript-by-session endpoint; the
    /// best available approximation is a semantic search scoped to the
    /// conversation id used as the ingest `session_id` tag.
    async fn get_conversation_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<MemoryMessage>> {
        let response = self
            .provider
            .search(RagSearchRequest { query: conversation_id.to_string(), limit: Some(limit as u32), ..Default::default() })
            .await?;
        Ok(response
            .memories
            .into_iter()
            .map(|m| MemoryMessage { role: m.source.unwrap_or_else(|| "unknown".to_string()), content: m.content })
            .collect())
    }
}

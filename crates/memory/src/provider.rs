//! The `SerialMemoryProvider` trait defines the interface for all
//! SerialMemory backends (REST, MCP, hybrid, mock/test).

use async_trait::async_trait;
use fathom_domain::error::Result;

use crate::types::{IngestResponse, MemoryIngestRequest, RagSearchRequest, RagSearchResponse};

/// Abstraction over the SerialMemoryServer API surface actually used by
/// the `MemoryStore` port (`store_adapter::SerialMemoryStore`): semantic
/// search and ingestion.
///
/// Implementations may talk to the real REST API, an MCP bridge, or a
/// test double. All methods return `fathom_domain::error::Result`.
#[async_trait]
pub trait SerialMemoryProvider: Send + Sync {
    /// Semantic search across the memory graph (POST /api/rag/search).
    async fn search(&self, req: RagSearchRequest) -> Result<RagSearchResponse>;

    /// Ingest a new memory (POST /api/memories).
    async fn ingest(&self, req: MemoryIngestRequest) -> Result<IngestResponse>;
}

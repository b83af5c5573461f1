//! `fathom-memory` — the `MemoryStore` capability's client crate.
//!
//! Provides the [`SerialMemoryProvider`] trait that abstracts over the
//! SerialMemory API, a production REST implementation
//! ([`RestSerialMemoryClient`], the gateway's default), an MCP
//! implementation ([`McpSerialMemoryClient`]) for tooling that prefers
//! that surface, and typed DTOs matching the OpenAPI schema.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use fathom_domain::config::MemoryStoreConfig;
//! use fathom_memory::{RestSerialMemoryClient, SerialMemoryProvider, RagSearchRequest};
//!
//! # async fn example() -> fathom_domain::error::Result<()> {
//! let cfg = MemoryStoreConfig::default();
//! let client = RestSerialMemoryClient::new(&cfg)?;
//!
//! let results = client
//!     .search(RagSearchRequest {
//!         query: "user's favourite language".into(),
//!         limit: Some(5),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! println!("found {} memories", results.count);
//! # Ok(())
//! # }
//! ```

pub mod mcp;
pub mod provider;
pub mod rest;
pub mod store_adapter;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use mcp::McpSerialMemoryClient;
pub use provider::SerialMemoryProvider;
pub use rest::{from_reqwest, RestSerialMemoryClient};
pub use store_adapter::SerialMemoryStore;
pub use types::{
    IngestResponse, MemoryIngestRequest, RagSearchRequest, RagSearchResponse, RetrievedMemoryDto,
};

use std::sync::Arc;

use fathom_domain::config::MemoryStoreConfig;
use fathom_domain::error::Result;

/// Build the REST-backed [`SerialMemoryProvider`] used for the gateway's
/// hot path. [`McpSerialMemoryClient`] remains available for direct
/// construction by tooling that wants the MCP surface instead, but the
/// config carries no transport selector to switch between them at runtime.
pub fn create_provider(cfg: &MemoryStoreConfig) -> Result<Arc<dyn SerialMemoryProvider>> {
    let client = RestSerialMemoryClient::new(cfg)?;
    Ok(Arc::new(client))
}

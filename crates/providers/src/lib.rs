//! `fathom-providers` — concrete [`LlmProvider`] adapters.
//!
//! Provides the [`LlmProvider`] trait that abstracts over chat-completion
//! backends, an Anthropic Messages API implementation ([`AnthropicProvider`]),
//! and an OpenAI-compatible implementation ([`OpenAiCompatProvider`]) that
//! also covers Azure OpenAI, Ollama, vLLM, and LM Studio.
//!
//! # Quick start
//!
//! Use [`create_provider`] to build the right implementation based on a
//! [`ProviderConfig`]'s `kind` field:
//!
//! ```rust,no_run
//! use fathom_domain::config::ProviderConfig;
//! use fathom_providers::create_provider;
//!
//! # fn example(cfg: &ProviderConfig) -> fathom_domain::error::Result<()> {
//! let provider = create_provider(cfg)?;
//! println!("provider ready: {}", provider.provider_id());
//! # Ok(())
//! # }
//! ```

pub mod anthropic;
pub mod auth;
pub mod openai_compat;
pub mod traits;
pub(crate) mod util;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use anthropic::AnthropicProvider;
pub use auth::AuthRotator;
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};

use std::sync::Arc;

use fathom_domain::config::{ProviderConfig, ProviderKind};
use fathom_domain::error::Result;

/// Build the [`LlmProvider`] implementation named by `cfg.kind`.
///
/// There is exactly one run-time `LLM` capability per
/// [`fathom_domain::config::LlmConfig`]; this is a plain constructor
/// dispatch, not a router — callers that need to try more than one
/// provider (e.g. honoring `LlmStartupPolicy::RequireOne` over a list)
/// call this once per configured [`ProviderConfig`].
pub fn create_provider(cfg: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    match cfg.kind {
        ProviderKind::Anthropic => {
            let provider = AnthropicProvider::from_config(cfg)?;
            Ok(Arc::new(provider))
        }
        ProviderKind::OpenaiCompat => {
            let provider = OpenAiCompatProvider::from_config(cfg)?;
            Ok(Arc::new(provider))
        }
    }
}

//! `create_provider` is a plain constructor dispatch over `ProviderKind`,
//! not a router — these tests exercise that dispatch end-to-end rather
//! than reaching into either adapter's internals.

use fathom_domain::config::{AuthConfig, AuthMode, ProviderConfig, ProviderKind};
use fathom_providers::create_provider;

fn config(kind: ProviderKind, id: &str) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        kind,
        base_url: "https://example.invalid".to_string(),
        auth: AuthConfig { mode: AuthMode::ApiKey, key: Some("test-key".to_string()), ..Default::default() },
        default_model: None,
    }
}

#[test]
fn anthropic_kind_builds_a_provider_with_matching_id() {
    let cfg = config(ProviderKind::Anthropic, "anthropic-primary");
    let provider = create_provider(&cfg).expect("anthropic provider should construct with a configured key");
    assert_eq!(provider.provider_id(), "anthropic-primary");
}

#[test]
fn openai_compat_kind_builds_a_provider_with_matching_id() {
    let cfg = config(ProviderKind::OpenaiCompat, "local-vllm");
    let provider = create_provider(&cfg).expect("openai-compat provider should construct with a configured key");
    assert_eq!(provider.provider_id(), "local-vllm");
}

#[test]
fn missing_credentials_fail_construction_rather_than_the_first_request() {
    let mut cfg = config(ProviderKind::Anthropic, "anthropic-primary");
    cfg.auth = AuthConfig::default();
    let err = create_provider(&cfg).expect_err("no key or env configured must fail at construction");
    assert!(err.to_string().contains("no API key configured"), "unexpected error: {err}");
}

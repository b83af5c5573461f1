//! Structured logging plus optional OTLP trace export, gated behind
//! `ObservabilityConfig.otlp_endpoint` (spec §10.1). When unset, only the
//! JSON log layer runs and `opentelemetry` is never touched — matching
//! the doc comment on `ObservabilityConfig` itself.

use axum::http::HeaderMap;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use fathom_domain::config::ObservabilityConfig;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fathom=info,tower_http=info"))
}

/// Initialize the global tracing subscriber. Call exactly once, at the
/// top of `main`.
pub fn init(config: &ObservabilityConfig) {
    let fmt_layer = tracing_subscriber::fmt::layer().json();
    let registry = tracing_subscriber::registry().with(env_filter()).with(fmt_layer);

    let Some(endpoint) = &config.otlp_endpoint else {
        registry.init();
        return;
    };

    match build_tracer(endpoint, &config.service_name, config.sample_rate) {
        Ok(tracer) => {
            registry.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
            tracing::info!(endpoint = %endpoint, "OTLP trace export enabled");
        }
        Err(err) => {
            registry.init();
            tracing::warn!(error = %err, "failed to initialize OTLP exporter; continuing with JSON logs only");
        }
    }
}

fn build_tracer(endpoint: &str, service_name: &str, sample_rate: f64) -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::global;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint).build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sample_rate))
        .with_resource(Resource::builder().with_attribute(KeyValue::new("service.name", service_name.to_string())).build())
        .build();

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(opentelemetry::trace::TracerProvider::tracer(&provider, service_name.to_string()))
}

/// Adapts an axum `HeaderMap` to the `opentelemetry::propagation::Extractor`
/// the global propagator expects.
struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Extract the W3C trace context carried on an inbound request, per spec
/// §6 — honoring the `traceparent` header, or the `client_traceparent`
/// body field for callers that can't set arbitrary headers.
pub fn extract_parent_context(headers: &HeaderMap, client_traceparent: Option<&str>) -> opentelemetry::Context {
    let propagator = TraceContextPropagator::new();

    if let Some(traceparent) = client_traceparent {
        let mut synthetic = HeaderMap::new();
        if let Ok(value) = axum::http::HeaderValue::from_str(traceparent) {
            synthetic.insert("traceparent", value);
        }
        return propagator.extract(&HeaderExtractor(&synthetic));
    }

    propagator.extract(&HeaderExtractor(headers))
}

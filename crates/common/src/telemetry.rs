//! Structured logging and optional OpenTelemetry export.
//!
//! Every process logs JSON lines to stdout. With `otel_enabled` spans and log
//! events are also shipped over OTLP/gRPC and the W3C trace context
//! propagator is installed, which is what links a publish span to the
//! consume span on the other side of the stream.

use anyhow::{Context, Result};
use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::{
    logs::LoggerProvider,
    propagation::TraceContextPropagator,
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing::Subscriber;
use tracing_subscriber::{
    layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    /// Used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "point-ingest".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
        }
    }
}

/// Holds the OTLP providers so pending spans and logs can be flushed on exit.
pub struct TelemetryGuard {
    providers: Option<(SdkTracerProvider, LoggerProvider)>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Some((tracer_provider, logger_provider)) = self.providers {
            if let Err(e) = tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {:?}", e);
            }
            if let Err(e) = logger_provider.shutdown() {
                eprintln!("Error shutting down logger provider: {:?}", e);
            }
        }
    }
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// JSON lines on stdout. Generic over the stack it sits on, since the plain
/// and the OTLP subscribers differ in type.
fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(true)
        .with_current_span(true)
}

/// Install the global subscriber. Must be called once, inside a tokio runtime
/// when OTLP export is enabled.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard> {
    if !config.otel_enabled {
        tracing_subscriber::registry()
            .with(env_filter(&config.log_level))
            .with(json_layer())
            .try_init()
            .context("Failed to install tracing subscriber")?;

        return Ok(TelemetryGuard { providers: None });
    }

    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::new(vec![KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        config.service_name.clone(),
    )]);

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("Failed to build OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter, runtime::Tokio)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let log_exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("Failed to build OTLP log exporter")?;

    let logger_provider = LoggerProvider::builder()
        .with_batch_exporter(log_exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());

    // The span layer goes first so the log bridge sees the OTel context
    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(OpenTelemetryTracingBridge::new(&logger_provider))
        .with(json_layer())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(TelemetryGuard {
        providers: Some((tracer_provider, logger_provider)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "point-ingest");
        assert_eq!(config.otel_endpoint, "http://localhost:4317");
        assert!(!config.otel_enabled);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_json_layer_fits_plain_and_otel_stacks() {
        let plain = tracing_subscriber::registry()
            .with(env_filter("debug"))
            .with(json_layer());
        tracing::subscriber::with_default(plain, || tracing::info!(mode = "plain", "logged"));

        let tracer = SdkTracerProvider::builder().build().tracer("test");
        let logger_provider = LoggerProvider::builder().build();
        let otel = tracing_subscriber::registry()
            .with(env_filter("debug"))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(OpenTelemetryTracingBridge::new(&logger_provider))
            .with(json_layer());
        tracing::subscriber::with_default(otel, || {
            tracing::info_span!("publish").in_scope(|| tracing::info!(mode = "otel", "logged"))
        });
    }

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let config = TelemetryConfig::default();
        let first = init_telemetry(&config);
        let second = init_telemetry(&config);

        // Another test may already own the global subscriber
        assert!(first.is_err() || second.is_err());
        if let Ok(guard) = first {
            guard.shutdown();
        }
    }
}

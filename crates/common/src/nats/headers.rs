use async_nats::header::NATS_MESSAGE_ID;
use async_nats::HeaderMap;
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use tracing_opentelemetry::OpenTelemetrySpanExt;

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

struct NatsHeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for NatsHeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

struct NatsHeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for NatsHeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        vec![TRACEPARENT, TRACESTATE]
    }
}

/// Set the JetStream deduplication id on outgoing headers.
pub fn set_msg_id(headers: &mut HeaderMap, msg_id: &str) {
    headers.insert(NATS_MESSAGE_ID, msg_id);
}

/// Read the JetStream deduplication id from message headers, if present.
pub fn msg_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(NATS_MESSAGE_ID)
        .map(|v| v.as_str().to_string())
        .filter(|v| !v.is_empty())
}

/// Inject the current span's W3C trace context into NATS headers.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        let ctx = tracing::Span::current().context();
        propagator.inject_context(&ctx, &mut NatsHeaderInjector(headers));
    });
}

pub fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&NatsHeaderExtractor(headers)))
}

/// Parent the given span on the trace that published the message.
pub fn set_span_parent(span: &tracing::Span, headers: &HeaderMap) {
    span.set_parent(extract_trace_context(headers));
}

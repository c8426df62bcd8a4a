use std::task::{Context, Poll};
use std::time::Instant;

use super::types::{PublishRequest, PublishResponse};
use crate::nats::headers::inject_trace_context;
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{error, field, info, info_span, Instrument, Span};

#[derive(Clone, Debug, Default)]
pub struct NatsTracingConfig {
    pub service_name: String,
}

impl NatsTracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

/// Wraps every publish in a `nats_publish` span keyed by the message's
/// dedup id.
///
/// The span's trace context goes out in the message headers, and the stream's
/// answer (sequence, or the fact that the id was already stored) is recorded
/// on the span and logged once.
#[derive(Clone)]
pub struct NatsPublishTracingLayer {
    config: NatsTracingConfig,
}

impl NatsPublishTracingLayer {
    pub fn new(config: NatsTracingConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for NatsPublishTracingLayer {
    type Service = NatsPublishTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsPublishTracingService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct NatsPublishTracingService<S> {
    inner: S,
    config: NatsTracingConfig,
}

fn publish_span(config: &NatsTracingConfig, req: &PublishRequest) -> Span {
    info_span!(
        target: "nats",
        "nats_publish",
        otel.name = "nats_publish",
        messaging.system = "nats",
        messaging.operation = "publish",
        messaging.destination.name = %req.subject,
        messaging.message.id = %req.msg_id,
        messaging.message.body.size = req.payload.len(),
        messaging.nats.stream = field::Empty,
        messaging.nats.sequence = field::Empty,
        messaging.nats.duplicate = field::Empty,
        service.name = %config.service_name,
        otel.status_code = field::Empty,
    )
}

fn record_ack(span: &Span, msg_id: &str, response: &PublishResponse, elapsed_ms: u128) {
    let ack = &response.ack;
    span.record("messaging.nats.stream", ack.stream.as_str());
    span.record("messaging.nats.sequence", ack.sequence);
    span.record("messaging.nats.duplicate", ack.duplicate);
    span.record("otel.status_code", "OK");

    if ack.duplicate {
        info!(
            msg_id = %msg_id,
            stream = %ack.stream,
            sequence = ack.sequence,
            elapsed_ms = %elapsed_ms,
            "stream already holds this msg_id, publish collapsed"
        );
    } else {
        info!(
            msg_id = %msg_id,
            stream = %ack.stream,
            sequence = ack.sequence,
            elapsed_ms = %elapsed_ms,
            "message persisted on stream"
        );
    }
}

impl<S> Service<PublishRequest> for NatsPublishTracingService<S>
where
    S: Service<PublishRequest, Response = PublishResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: PublishRequest) -> Self::Future {
        let span = publish_span(&self.config, &req);
        span.in_scope(|| inject_trace_context(&mut req.headers));

        let msg_id = req.msg_id.clone();
        let started = Instant::now();
        let mut inner = self.inner.clone();
        let outcome_span = span.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let elapsed_ms = started.elapsed().as_millis();

                match &result {
                    Ok(response) => record_ack(&outcome_span, &msg_id, response, elapsed_ms),
                    Err(e) => {
                        outcome_span.record("otel.status_code", "ERROR");
                        error!(
                            msg_id = %msg_id,
                            elapsed_ms = %elapsed_ms,
                            error = %e,
                            "stream did not confirm publish"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

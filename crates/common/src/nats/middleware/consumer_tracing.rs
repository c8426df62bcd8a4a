use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::nats::headers::set_span_parent;
use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{error, field, info, info_span, warn, Instrument, Span};

/// Tower layer opening one `nats_consume` span per message, parented on the
/// trace context the publisher injected.
///
/// The commit outcome is recorded on the span and logged once: acks at info,
/// naks with their reason at warn.
#[derive(Clone, Default)]
pub struct NatsConsumeTracingLayer {
    consumer_name: String,
}

impl NatsConsumeTracingLayer {
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
        }
    }
}

impl<S> Layer<S> for NatsConsumeTracingLayer {
    type Service = NatsConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeTracingService {
            inner: service,
            consumer_name: self.consumer_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct NatsConsumeTracingService<S> {
    inner: S,
    consumer_name: String,
}

impl<S> Service<ConsumeRequest> for NatsConsumeTracingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "nats_consume",
            otel.name = "nats_consume",
            messaging.system = "nats",
            messaging.operation = "process",
            messaging.destination.name = %req.subject,
            messaging.consumer.name = %self.consumer_name,
            messaging.message.id = %req.msg_id().unwrap_or_default(),
            messaging.message.body.size = req.payload.len(),
            messaging.nats.outcome = field::Empty,
            otel.status_code = field::Empty,
        );

        if let Some(headers) = &req.headers {
            set_span_parent(&span, headers);
        }

        let msg_id = req.msg_id().unwrap_or_default();
        let started = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let elapsed_ms = started.elapsed().as_millis();
                let span = Span::current();

                match &result {
                    Ok(ConsumeResponse::Ack) => {
                        span.record("messaging.nats.outcome", "ack");
                        span.record("otel.status_code", "OK");
                        info!(msg_id = %msg_id, elapsed_ms = %elapsed_ms, "message committed, acking");
                    }
                    Ok(ConsumeResponse::Nak(reason)) => {
                        span.record("messaging.nats.outcome", "nak");
                        span.record("otel.status_code", "ERROR");
                        warn!(
                            msg_id = %msg_id,
                            elapsed_ms = %elapsed_ms,
                            reason = reason.as_deref().unwrap_or("unspecified"),
                            "message not committed, requesting redelivery"
                        );
                    }
                    Err(e) => {
                        span.record("otel.status_code", "ERROR");
                        error!(msg_id = %msg_id, elapsed_ms = %elapsed_ms, error = %e, "consume handler failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

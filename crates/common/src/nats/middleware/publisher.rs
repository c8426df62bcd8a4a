use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::types::{PublishRequest, PublishResponse};
use super::{NatsPublishTracingLayer, NatsPublishTracingService, NatsTracingConfig};
use crate::nats::headers::set_msg_id;
use crate::nats::JetStreamPublisher;
use anyhow::Result;
use tower::{Service, ServiceBuilder};

/// Innermost service: stamps the dedup header and hands the message to JetStream
#[derive(Clone)]
pub struct NatsPublishService {
    publisher: Arc<dyn JetStreamPublisher>,
}

impl NatsPublishService {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>) -> Self {
        Self { publisher }
    }
}

impl Service<PublishRequest> for NatsPublishService {
    type Response = PublishResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let publisher = Arc::clone(&self.publisher);

        Box::pin(async move {
            let PublishRequest {
                subject,
                msg_id,
                payload,
                mut headers,
            } = req;
            set_msg_id(&mut headers, &msg_id);

            let ack = publisher
                .publish_with_headers(subject.clone(), headers, payload)
                .await?;
            Ok(PublishResponse { subject, ack })
        })
    }
}

/// Publish stack: the instrumentation layer around the JetStream publish
pub type LayeredPublisher = NatsPublishTracingService<NatsPublishService>;

pub struct NatsPublisherBuilder {
    publisher: Arc<dyn JetStreamPublisher>,
    tracing_config: NatsTracingConfig,
}

impl NatsPublisherBuilder {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>) -> Self {
        Self {
            publisher,
            tracing_config: NatsTracingConfig::default(),
        }
    }

    pub fn with_tracing(mut self, config: NatsTracingConfig) -> Self {
        self.tracing_config = config;
        self
    }

    pub fn build(self) -> LayeredPublisher {
        ServiceBuilder::new()
            .layer(NatsPublishTracingLayer::new(self.tracing_config))
            .service(NatsPublishService::new(self.publisher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PublishAck;
    use crate::nats::{msg_id, MockJetStreamPublisher};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_publish_sets_msg_id_header() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .withf(|subject, headers, payload| {
                subject == "msg.targets"
                    && msg_id(headers).as_deref() == Some("id-1")
                    && &payload[..] == b"{}"
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(PublishAck {
                    stream: "TARGETS".to_string(),
                    sequence: 7,
                    duplicate: false,
                    msg_id: "id-1".to_string(),
                })
            });

        let publisher = NatsPublisherBuilder::new(Arc::new(mock))
            .with_tracing(NatsTracingConfig::new("test"))
            .build();

        let response = publisher
            .oneshot(PublishRequest::new("msg.targets", "id-1", "{}"))
            .await
            .unwrap();

        assert_eq!(response.subject, "msg.targets");
        assert_eq!(response.ack.sequence, 7);
    }

    #[tokio::test]
    async fn test_publish_error_propagates() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("no responders")));

        let publisher = NatsPublisherBuilder::new(Arc::new(mock)).build();

        let result = publisher
            .oneshot(PublishRequest::new("msg.targets", "id-2", "{}"))
            .await;

        assert!(result.unwrap_err().to_string().contains("no responders"));
    }

    #[tokio::test]
    async fn test_duplicate_publish_reports_stored_sequence() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .times(1)
            .returning(|_, _, _| {
                Ok(PublishAck {
                    stream: "TARGETS".to_string(),
                    sequence: 4,
                    duplicate: true,
                    msg_id: "id-3".to_string(),
                })
            });

        let publisher = NatsPublisherBuilder::new(Arc::new(mock)).build();

        let response = publisher
            .oneshot(PublishRequest::new("msg.targets", "id-3", "{}"))
            .await
            .unwrap();

        assert!(response.ack.duplicate);
        assert_eq!(response.ack.sequence, 4);
        assert_eq!(response.ack.msg_id, "id-3");
    }
}

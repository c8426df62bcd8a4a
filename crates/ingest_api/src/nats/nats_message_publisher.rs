use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, MessageEnvelope, MessagePublisher, PublishAck};
use common::nats::{LayeredPublisher, PublishRequest};
use tower::ServiceExt;

/// `MessagePublisher` over the layered JetStream publish stack
#[derive(Clone)]
pub struct NatsMessagePublisher {
    publisher: LayeredPublisher,
}

impl NatsMessagePublisher {
    pub fn new(publisher: LayeredPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl MessagePublisher for NatsMessagePublisher {
    async fn publish(&self, envelope: MessageEnvelope) -> DomainResult<PublishAck> {
        let response = self
            .publisher
            .clone()
            .oneshot(PublishRequest::from(envelope))
            .await
            .map_err(|e| DomainError::PublishError(format!("{e:#}")))?;

        Ok(response.ack)
    }
}

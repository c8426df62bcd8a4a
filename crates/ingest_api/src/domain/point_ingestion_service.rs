use bytes::Bytes;
use common::domain::{
    validate_submission, DomainError, DomainResult, MessageEnvelope, MessagePublisher,
    PipelineVariant, PublishAck, Submission, Target,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One vendor request as it arrives from the transport layer
#[derive(Debug, Clone, Validate)]
pub struct IngestPointInput {
    #[garde(length(min = 1, max = 256))]
    pub vendor_id: String,
    #[garde(skip)]
    pub body: Bytes,
}

/// What the caller gets back once the message is durably queued
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub submission: Submission,
    pub ack: PublishAck,
}

/// Validates vendor submissions and queues them for persistence.
///
/// Flow:
/// 1. Validate the request fields
/// 2. Parse the body and check every feature is an in-range point
/// 3. Build the message payload for the configured pipeline variant
/// 4. Publish and wait for the stream to persist it
pub struct PointIngestionService {
    publisher: Arc<dyn MessagePublisher>,
    variant: PipelineVariant,
    subject: String,
}

impl PointIngestionService {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        variant: PipelineVariant,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            variant,
            subject: subject.into(),
        }
    }

    #[instrument(skip(self, input), fields(vendor_id = %input.vendor_id, variant = %self.variant, body_bytes = input.body.len()))]
    pub async fn ingest(&self, input: IngestPointInput) -> DomainResult<IngestReceipt> {
        common::garde::validate_struct(&input)?;

        let submission = validate_submission(&input.body)?;
        debug!(
            features = submission.feature_count(),
            "submission accepted by validator"
        );

        let payload = match self.variant {
            PipelineVariant::Targets => {
                let target = Target::new(input.vendor_id, submission.clone());
                serde_json::to_vec(&target)
                    .map(Bytes::from)
                    .map_err(|e| DomainError::PayloadConversionError(e.to_string()))?
            }
            PipelineVariant::Points => input.body,
        };

        let envelope = MessageEnvelope::new(self.subject.clone(), payload);
        let ack = self.publisher.publish(envelope).await?;

        debug!(
            msg_id = %ack.msg_id,
            sequence = ack.sequence,
            "submission queued"
        );

        Ok(IngestReceipt { submission, ack })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockMessagePublisher, ValidationError};
    use serde_json::json;

    const SAMPLE: &str = r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[102.0,0.5]},"properties":{"prop0":"value0"}}"#;

    fn ack_for(envelope: &MessageEnvelope) -> PublishAck {
        PublishAck {
            stream: "TARGETS".to_string(),
            sequence: 1,
            duplicate: false,
            msg_id: envelope.msg_id.clone(),
        }
    }

    fn input(vendor_id: &str, body: &'static str) -> IngestPointInput {
        IngestPointInput {
            vendor_id: vendor_id.to_string(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_ingest_publishes_target() {
        let mut mock_publisher = MockMessagePublisher::new();

        mock_publisher
            .expect_publish()
            .withf(|envelope: &MessageEnvelope| {
                let target: Target = serde_json::from_slice(&envelope.payload).unwrap();
                envelope.subject == "msg.targets"
                    && !envelope.msg_id.is_empty()
                    && target.vendor == "123"
                    && serde_json::to_value(&target.point).unwrap()
                        == serde_json::from_str::<serde_json::Value>(SAMPLE).unwrap()
            })
            .times(1)
            .returning(|envelope| Ok(ack_for(&envelope)));

        let service = PointIngestionService::new(
            Arc::new(mock_publisher),
            PipelineVariant::Targets,
            "msg.targets",
        );

        let receipt = service.ingest(input("123", SAMPLE)).await.unwrap();

        assert_eq!(
            serde_json::to_value(&receipt.submission).unwrap(),
            json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [102.0, 0.5]},
                "properties": {"prop0": "value0"}
            })
        );
        assert_eq!(receipt.ack.msg_id.len(), 20);
    }

    #[tokio::test]
    async fn test_resubmitted_body_is_published_under_a_new_msg_id() {
        let mut mock_publisher = MockMessagePublisher::new();

        mock_publisher
            .expect_publish()
            .times(2)
            .returning(|envelope| Ok(ack_for(&envelope)));

        let service = PointIngestionService::new(
            Arc::new(mock_publisher),
            PipelineVariant::Targets,
            "msg.targets",
        );

        let first = service.ingest(input("123", SAMPLE)).await.unwrap();
        let second = service.ingest(input("123", SAMPLE)).await.unwrap();

        assert_ne!(first.ack.msg_id, second.ack.msg_id);
    }

    #[tokio::test]
    async fn test_points_variant_forwards_raw_body() {
        let body = r#"{ "type": "Feature", "geometry": {"type":"Point","coordinates":[1,2]}, "properties": null }"#;
        let mut mock_publisher = MockMessagePublisher::new();

        mock_publisher
            .expect_publish()
            .withf(move |envelope: &MessageEnvelope| {
                envelope.subject == "msg.points" && envelope.payload.as_ref() == body.as_bytes()
            })
            .times(1)
            .returning(|envelope| Ok(ack_for(&envelope)));

        let service = PointIngestionService::new(
            Arc::new(mock_publisher),
            PipelineVariant::Points,
            "msg.points",
        );

        assert!(service.ingest(input("123", body)).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_submission_is_never_published() {
        let mut mock_publisher = MockMessagePublisher::new();
        mock_publisher.expect_publish().times(0);

        let service = PointIngestionService::new(
            Arc::new(mock_publisher),
            PipelineVariant::Targets,
            "msg.targets",
        );

        let result = service
            .ingest(input(
                "123",
                r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[0.0,91.0]},"properties":{}}"#,
            ))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::InvalidSubmission(ValidationError::OutOfRange(_)))
        ));
    }

    #[tokio::test]
    async fn test_empty_vendor_id_fails_validation() {
        let mut mock_publisher = MockMessagePublisher::new();
        mock_publisher.expect_publish().times(0);

        let service = PointIngestionService::new(
            Arc::new(mock_publisher),
            PipelineVariant::Targets,
            "msg.targets",
        );

        let result = service.ingest(input("", SAMPLE)).await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let mut mock_publisher = MockMessagePublisher::new();
        mock_publisher
            .expect_publish()
            .times(1)
            .returning(|_| Err(DomainError::PublishError("no responders".to_string())));

        let service = PointIngestionService::new(
            Arc::new(mock_publisher),
            PipelineVariant::Targets,
            "msg.targets",
        );

        let result = service.ingest(input("123", SAMPLE)).await;

        assert!(matches!(result, Err(DomainError::PublishError(_))));
    }
}

use common::domain::{
    CommitOutcome, DocumentRepository, DomainError, InsertDocumentInput, PipelineVariant,
    Submission, Target,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

pub const DEFAULT_INSERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Decides the fate of one delivered message: store it, retry it later, or
/// drop it for good.
///
/// Payloads that cannot be parsed are dropped without touching the store,
/// since redelivering them can never succeed. Store failures and timeouts are
/// always retried.
pub struct TargetCommitter {
    repository: Arc<dyn DocumentRepository>,
    variant: PipelineVariant,
    insert_timeout: Duration,
}

impl TargetCommitter {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        variant: PipelineVariant,
        insert_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            variant,
            insert_timeout,
        }
    }

    #[instrument(skip(self, payload), fields(variant = %self.variant, payload_bytes = payload.len()))]
    pub async fn commit(&self, msg_id: Option<String>, payload: &[u8]) -> CommitOutcome {
        let document = match self.parse(payload) {
            Ok(document) => document,
            Err(reason) => {
                error!(
                    msg_id = msg_id.as_deref().unwrap_or(""),
                    payload = %String::from_utf8_lossy(payload),
                    reason = %reason,
                    "failed to parse message from stream, dropping it"
                );
                return CommitOutcome::DropPermanently(reason);
            }
        };

        let insert = self.repository.insert_one(InsertDocumentInput {
            msg_id: msg_id.clone(),
            document,
        });

        match tokio::time::timeout(self.insert_timeout, insert).await {
            Ok(Ok(inserted)) => {
                debug!(
                    document_id = %inserted.id,
                    duplicate = inserted.duplicate,
                    "document committed"
                );
                CommitOutcome::Commit {
                    document_id: inserted.id,
                    duplicate: inserted.duplicate,
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to save document, will retry");
                CommitOutcome::RetryLater(e.to_string())
            }
            Err(_) => {
                let e = DomainError::StoreTimeout(self.insert_timeout);
                warn!(error = %e, "failed to save document, will retry");
                CommitOutcome::RetryLater(e.to_string())
            }
        }
    }

    /// Decode to the typed shape and back, so only well-formed documents reach the store.
    fn parse(&self, payload: &[u8]) -> Result<Value, String> {
        let document = match self.variant {
            PipelineVariant::Targets => serde_json::from_slice::<Target>(payload)
                .and_then(|target| serde_json::to_value(&target)),
            PipelineVariant::Points => serde_json::from_slice::<Submission>(payload)
                .and_then(|submission| serde_json::to_value(&submission)),
        };

        document.map_err(|e| format!("Error parsing {}: {e}", self.variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{Feature, Geometry, InsertedDocument, MockDocumentRepository};

    fn target_bytes() -> Vec<u8> {
        let feature = Feature::new(Geometry::point(102.0, 0.5).unwrap(), serde_json::Map::new());
        serde_json::to_vec(&Target::new("123", Submission::Feature(feature))).unwrap()
    }

    fn committer(repository: MockDocumentRepository, timeout: Duration) -> TargetCommitter {
        TargetCommitter::new(Arc::new(repository), PipelineVariant::Targets, timeout)
    }

    #[tokio::test]
    async fn test_commit_success() {
        let mut mock_repo = MockDocumentRepository::new();
        mock_repo
            .expect_insert_one()
            .withf(|input: &InsertDocumentInput| {
                input.msg_id.as_deref() == Some("m-1") && input.document["Vendor"] == "123"
            })
            .times(1)
            .returning(|_| {
                Ok(InsertedDocument {
                    id: "doc-1".to_string(),
                    duplicate: false,
                })
            });

        let outcome = committer(mock_repo, DEFAULT_INSERT_TIMEOUT)
            .commit(Some("m-1".to_string()), &target_bytes())
            .await;

        assert_eq!(
            outcome,
            CommitOutcome::Commit {
                document_id: "doc-1".to_string(),
                duplicate: false
            }
        );
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_dropped_without_writes() {
        let mut mock_repo = MockDocumentRepository::new();
        mock_repo.expect_insert_one().times(0);

        let committer = committer(mock_repo, DEFAULT_INSERT_TIMEOUT);

        let payloads: [&[u8]; 3] = [b"not json", br#"{"Vendor":"123"}"#, br#"{"type":"Feature"}"#];
        for payload in payloads {
            let outcome = committer.commit(None, payload).await;
            assert!(matches!(outcome, CommitOutcome::DropPermanently(_)));
            assert!(outcome.should_ack());
        }
    }

    #[tokio::test]
    async fn test_store_error_is_retried() {
        let mut mock_repo = MockDocumentRepository::new();
        mock_repo
            .expect_insert_one()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("connection reset"))));

        let outcome = committer(mock_repo, DEFAULT_INSERT_TIMEOUT)
            .commit(Some("m-2".to_string()), &target_bytes())
            .await;

        match outcome {
            CommitOutcome::RetryLater(reason) => assert!(reason.contains("connection reset")),
            other => panic!("expected RetryLater, got {other:?}"),
        }
    }

    struct SlowRepository;

    #[async_trait::async_trait]
    impl DocumentRepository for SlowRepository {
        async fn insert_one(
            &self,
            _input: InsertDocumentInput,
        ) -> common::domain::DomainResult<InsertedDocument> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("insert should have timed out")
        }
    }

    #[tokio::test]
    async fn test_store_timeout_is_retried() {
        let committer = TargetCommitter::new(
            Arc::new(SlowRepository),
            PipelineVariant::Targets,
            Duration::from_millis(20),
        );

        let outcome = committer.commit(None, &target_bytes()).await;

        match outcome {
            CommitOutcome::RetryLater(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected RetryLater, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_points_variant_stores_submission() {
        let mut mock_repo = MockDocumentRepository::new();
        mock_repo
            .expect_insert_one()
            .withf(|input: &InsertDocumentInput| input.document["type"] == "Feature")
            .times(1)
            .returning(|_| {
                Ok(InsertedDocument {
                    id: "doc-2".to_string(),
                    duplicate: true,
                })
            });

        let committer =
            TargetCommitter::new(Arc::new(mock_repo), PipelineVariant::Points, DEFAULT_INSERT_TIMEOUT);
        let body = br#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":null}"#;

        let outcome = committer.commit(Some("m-3".to_string()), body).await;

        assert_eq!(
            outcome,
            CommitOutcome::Commit {
                document_id: "doc-2".to_string(),
                duplicate: true
            }
        );
    }
}

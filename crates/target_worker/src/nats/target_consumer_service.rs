use crate::domain::TargetCommitter;
use common::domain::CommitOutcome;
use common::nats::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::debug;

/// Tower service that hands each delivered message to the committer and
/// translates the outcome into a broker signal.
///
/// `Commit` and `DropPermanently` ack; `RetryLater` naks so the broker
/// redelivers.
#[derive(Clone)]
pub struct TargetConsumerService {
    committer: Arc<TargetCommitter>,
}

impl TargetConsumerService {
    pub fn new(committer: Arc<TargetCommitter>) -> Self {
        Self { committer }
    }
}

impl Service<ConsumeRequest> for TargetConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let committer = Arc::clone(&self.committer);

        Box::pin(async move {
            let outcome = committer.commit(req.msg_id(), &req.payload).await;

            Ok(match outcome {
                CommitOutcome::Commit {
                    document_id,
                    duplicate,
                } => {
                    debug!(document_id = %document_id, duplicate, "acking committed message");
                    ConsumeResponse::ack()
                }
                CommitOutcome::DropPermanently(_) => ConsumeResponse::ack(),
                CommitOutcome::RetryLater(reason) => ConsumeResponse::nak(reason),
            })
        })
    }
}

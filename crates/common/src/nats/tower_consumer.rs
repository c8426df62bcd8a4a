use crate::nats::{ConsumeRequest, ConsumeResponse, DeliveredMessage, JetStreamConsumer, PullConsumer};
use anyhow::{Context, Result};
use async_nats::jetstream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info};

/// Durable consumer binding and fetch tuning.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub stream_name: String,
    /// Durable name; redeliveries survive consumer restarts under this name
    pub consumer_name: String,
    pub filter_subject: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// Upper bound on messages of one batch handled at the same time
    pub max_in_flight: usize,
    pub ack_wait: Duration,
    /// -1 redelivers forever
    pub max_deliver: i64,
    pub max_ack_pending: i64,
}

impl ConsumerSettings {
    fn pull_config(&self) -> jetstream::consumer::pull::Config {
        jetstream::consumer::pull::Config {
            name: Some(self.consumer_name.clone()),
            durable_name: Some(self.consumer_name.clone()),
            filter_subject: self.filter_subject.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: self.ack_wait,
            max_deliver: self.max_deliver,
            max_ack_pending: self.max_ack_pending,
            ..Default::default()
        }
    }
}

/// Pulls batches from a durable consumer and drives every message through a
/// Tower service, turning its `ConsumeResponse` into exactly one ack or nak.
///
/// Shutdown only interrupts the wait for the next batch. A batch that has
/// been fetched is always settled before `run` returns, so nothing is left
/// pending until `ack_wait` expires.
pub struct TowerConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    settings: ConsumerSettings,
    service: S,
}

impl<S> TowerConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        settings: ConsumerSettings,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            filter_subject = %settings.filter_subject,
            "creating tower nats consumer"
        );

        let consumer = jetstream
            .create_consumer(settings.pull_config(), &settings.stream_name)
            .await
            .context("failed to create consumer")?;

        info!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            "bound durable consumer"
        );

        Ok(Self {
            consumer,
            settings,
            service,
        })
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        debug!(
            stream = %self.settings.stream_name,
            consumer = %self.settings.consumer_name,
            "starting tower nats consumer"
        );

        loop {
            if ctx.is_cancelled() {
                break;
            }

            let fetched = tokio::select! {
                _ = ctx.cancelled() => break,
                fetched = self
                    .consumer
                    .fetch_messages(self.settings.batch_size, self.settings.max_wait) => fetched,
            };

            match fetched {
                Ok(messages) => self.process_batch(messages).await,
                Err(e) => {
                    error!(
                        stream = %self.settings.stream_name,
                        consumer = %self.settings.consumer_name,
                        error = %e,
                        "error fetching batch"
                    );
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!(
            stream = %self.settings.stream_name,
            consumer = %self.settings.consumer_name,
            "received shutdown signal, consumer stopped"
        );
        Ok(())
    }

    async fn process_batch(&self, messages: Vec<Box<dyn DeliveredMessage>>) {
        if messages.is_empty() {
            debug!("no messages in batch");
            return;
        }

        debug!(message_count = messages.len(), "received message batch");

        futures::stream::iter(messages)
            .for_each_concurrent(self.settings.max_in_flight.max(1), |msg| {
                settle(self.service.clone(), msg)
            })
            .await;
    }
}

async fn settle<S>(service: S, msg: Box<dyn DeliveredMessage>)
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>,
{
    let subject = msg.subject();
    let request = ConsumeRequest::new(subject.clone(), msg.payload(), msg.headers());

    let response = match service.oneshot(request).await {
        Ok(response) => response,
        Err(e) => {
            error!(subject = %subject, error = %e, "service error processing message");
            ConsumeResponse::nak(e.to_string())
        }
    };

    let settled = match response {
        ConsumeResponse::Ack => msg.ack().await,
        ConsumeResponse::Nak(_) => msg.nak().await,
    };

    if let Err(e) = settled {
        // Unsettled messages come back once ack_wait expires
        error!(subject = %subject, error = %e, "failed to settle message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::traits::{MockDeliveredMessage, MockJetStreamConsumer, MockPullConsumer};
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context as TaskContext, Poll};

    /// Acks payloads equal to "ok", naks everything else
    #[derive(Clone)]
    struct PayloadService;

    impl Service<ConsumeRequest> for PayloadService {
        type Response = ConsumeResponse;
        type Error = anyhow::Error;
        type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: ConsumeRequest) -> Self::Future {
            Box::pin(async move {
                match req.payload.as_ref() {
                    b"ok" => Ok(ConsumeResponse::Ack),
                    b"boom" => Err(anyhow::anyhow!("handler blew up")),
                    _ => Ok(ConsumeResponse::nak("not ok")),
                }
            })
        }
    }

    fn settings() -> ConsumerSettings {
        ConsumerSettings {
            stream_name: "TARGETS".to_string(),
            consumer_name: "TARGETS".to_string(),
            filter_subject: "msg.targets".to_string(),
            batch_size: 10,
            max_wait: Duration::from_millis(50),
            max_in_flight: 4,
            ack_wait: Duration::from_secs(30),
            max_deliver: -1,
            max_ack_pending: 1000,
        }
    }

    fn message(payload: &'static str, acks: usize, naks: usize) -> Box<dyn DeliveredMessage> {
        let mut msg = MockDeliveredMessage::new();
        msg.expect_subject().return_const("msg.targets".to_string());
        msg.expect_payload().return_const(Bytes::from_static(payload.as_bytes()));
        msg.expect_headers().returning(|| None);
        msg.expect_ack().times(acks).returning(|| Ok(()));
        msg.expect_nak().times(naks).returning(|| Ok(()));
        Box::new(msg)
    }

    #[tokio::test]
    async fn test_binds_durable_explicit_ack_consumer() {
        let mut mock_jetstream = MockJetStreamConsumer::new();

        mock_jetstream
            .expect_create_consumer()
            .withf(|config: &jetstream::consumer::pull::Config, stream_name: &str| {
                config.durable_name.as_deref() == Some("TARGETS")
                    && config.filter_subject == "msg.targets"
                    && config.ack_policy == jetstream::consumer::AckPolicy::Explicit
                    && config.ack_wait == Duration::from_secs(30)
                    && stream_name == "TARGETS"
            })
            .times(1)
            .returning(|_, _| Ok(Box::new(MockPullConsumer::new())));

        let result = TowerConsumer::new(Arc::new(mock_jetstream), settings(), PayloadService).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_creation_failure() {
        let mut mock_jetstream = MockJetStreamConsumer::new();

        mock_jetstream
            .expect_create_consumer()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("stream not found")));

        let result = TowerConsumer::new(Arc::new(mock_jetstream), settings(), PayloadService).await;

        let err = result.err().unwrap();
        assert!(err.to_string().contains("failed to create consumer"));
    }

    #[tokio::test]
    async fn test_batch_settles_each_message_once() {
        let mut mock_jetstream = MockJetStreamConsumer::new();
        mock_jetstream
            .expect_create_consumer()
            .returning(|_, _| Ok(Box::new(MockPullConsumer::new())));

        let consumer = TowerConsumer::new(Arc::new(mock_jetstream), settings(), PayloadService)
            .await
            .unwrap();

        consumer
            .process_batch(vec![
                message("ok", 1, 0),
                message("bad", 0, 1),
                message("boom", 0, 1),
                message("ok", 1, 0),
            ])
            .await;
    }

    /// Acks everything and requests shutdown as soon as it sees a message
    #[derive(Clone)]
    struct ShutdownOnFirstMessage(CancellationToken);

    impl Service<ConsumeRequest> for ShutdownOnFirstMessage {
        type Response = ConsumeResponse;
        type Error = anyhow::Error;
        type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ConsumeRequest) -> Self::Future {
            self.0.cancel();
            Box::pin(async move { Ok(ConsumeResponse::Ack) })
        }
    }

    #[tokio::test]
    async fn test_run_settles_fetched_batch_after_shutdown() {
        let token = CancellationToken::new();
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut mock_jetstream = MockJetStreamConsumer::new();
        let fetch_count = fetches.clone();
        mock_jetstream.expect_create_consumer().returning(move |_, _| {
            let mut pull = MockPullConsumer::new();
            let fetch_count = fetch_count.clone();
            pull.expect_fetch_messages().returning(move |_, _| {
                fetch_count.fetch_add(1, Ordering::SeqCst);
                Ok(vec![
                    message("ok", 1, 0),
                    message("ok", 1, 0),
                    message("ok", 1, 0),
                ])
            });
            Ok(Box::new(pull))
        });

        let consumer = TowerConsumer::new(
            Arc::new(mock_jetstream),
            settings(),
            ShutdownOnFirstMessage(token.clone()),
        )
        .await
        .unwrap();

        consumer.run(token).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}

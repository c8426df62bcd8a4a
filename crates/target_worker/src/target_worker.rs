use crate::domain::TargetCommitter;
use crate::nats::TargetConsumerService;
use common::domain::{DocumentRepository, PipelineVariant};
use common::nats::{
    ConsumerSettings, JetStreamConsumer, NatsConsumeTracingLayer, NatsConsumeTracingService,
    TowerConsumer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

pub struct TargetWorkerConfig {
    pub variant: PipelineVariant,
    pub consumer: ConsumerSettings,
    pub insert_timeout: Duration,
}

type TargetConsumerStack = NatsConsumeTracingService<TargetConsumerService>;

/// The `consumer` mode: drains the durable consumer into the document store
pub struct TargetWorker {
    consumer: TowerConsumer<TargetConsumerStack>,
}

impl TargetWorker {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        repository: Arc<dyn DocumentRepository>,
        config: TargetWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!(variant = %config.variant, "Initializing target worker module");

        let committer = Arc::new(TargetCommitter::new(
            repository,
            config.variant,
            config.insert_timeout,
        ));

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new(config.consumer.consumer_name.clone()))
            .service(TargetConsumerService::new(committer));

        let consumer = TowerConsumer::new(jetstream, config.consumer, service).await?;

        Ok(Self { consumer })
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| Box::pin(async move { self.consumer.run(ctx).await })
    }
}

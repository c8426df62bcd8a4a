use crate::domain::PointIngestionService;
use crate::http::{ingest_router, run_http_server, AppState, HttpServerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The `publisher` mode: HTTP ingress in front of the ingestion service
pub struct IngestApi {
    ingestion_service: Arc<PointIngestionService>,
    config: HttpServerConfig,
}

impl IngestApi {
    pub fn new(ingestion_service: Arc<PointIngestionService>, config: HttpServerConfig) -> Self {
        debug!("Initializing ingest API module");
        Self {
            ingestion_service,
            config,
        }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| {
            Box::pin(async move {
                let router = ingest_router(AppState {
                    ingestion_service: self.ingestion_service,
                });
                run_http_server(self.config, router, ctx).await
            })
        }
    }
}

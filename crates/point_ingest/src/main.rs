mod config;

use anyhow::Context;
use clap::{error::ErrorKind, Parser, ValueEnum};
use common::nats::{NatsClient, NatsPublisherBuilder, NatsTracingConfig};
use common::postgres::{PostgresClient, PostgresDocumentRepository};
use common::telemetry::init_telemetry;
use crate::config::ServiceConfig;
use ingest_api::nats::NatsMessagePublisher;
use ingest_api::{IngestApi, PointIngestionService};
use runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use target_worker::{TargetWorker, TargetWorkerConfig};
use tracing::{debug, error, info, warn};

/// Vendor point ingestion: HTTP to JetStream, JetStream to PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "point-ingest", version, about)]
struct Cli {
    /// Which half of the pipeline this process runs
    #[arg(value_enum)]
    mode: Mode,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    /// Accept vendor submissions over HTTP and publish them
    Publisher,
    /// Drain the durable consumer into the document store
    Consumer,
}

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry = match init_telemetry(&config.telemetry_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {:#}", e);
            std::process::exit(1);
        }
    };

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            error!(error = %e, "Invalid command line, expected 'publisher' or 'consumer'");
            telemetry.shutdown();
            std::process::exit(1);
        }
    };

    info!(
        mode = ?cli.mode,
        pipeline = %config.pipeline,
        otel_enabled = config.otel_enabled,
        "Starting point-ingest service"
    );
    debug!("Configuration: {:?}", config);

    let nats_client = match connect_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            telemetry.shutdown();
            std::process::exit(1);
        }
    };

    let runner = match cli.mode {
        Mode::Publisher => Ok(publisher_runner(&config, &nats_client)),
        Mode::Consumer => consumer_runner(&config, &nats_client).await,
    };

    let runner = match runner {
        Ok(runner) => runner,
        Err(e) => {
            error!(mode = ?cli.mode, "Failed to initialize: {:#}", e);
            telemetry.shutdown();
            std::process::exit(1);
        }
    };

    runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            if let Err(e) = nats_client.close().await {
                warn!("Error closing NATS connection: {:#}", e);
            }

            // Flush pending traces and logs
            telemetry.shutdown();

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

async fn connect_nats(config: &ServiceConfig) -> anyhow::Result<NatsClient> {
    let client = NatsClient::connect(&config.nats_url, config.startup_timeout()).await?;
    client
        .ensure_stream(
            &config.stream_name(),
            &config.subject(),
            config.duplicate_window(),
        )
        .await?;
    Ok(client)
}

fn publisher_runner(config: &ServiceConfig, nats_client: &NatsClient) -> Runner {
    let publisher = NatsPublisherBuilder::new(nats_client.create_publisher_client())
        .with_tracing(NatsTracingConfig::new(config.otel_service_name.clone()))
        .build();

    let ingestion_service = Arc::new(PointIngestionService::new(
        Arc::new(NatsMessagePublisher::new(publisher)),
        config.pipeline,
        config.subject(),
    ));

    let ingest_api = IngestApi::new(ingestion_service, config.http_server_config());

    Runner::new().with_named_process("ingest_api", ingest_api.into_runner_process())
}

async fn consumer_runner(
    config: &ServiceConfig,
    nats_client: &NatsClient,
) -> anyhow::Result<Runner> {
    info!("Initializing PostgreSQL...");
    let postgres_client = PostgresClient::from_url(&config.store_url, config.store_pool_size)?;
    tokio::time::timeout(config.startup_timeout(), postgres_client.ping())
        .await
        .context("Timed out reaching the document store")??;

    let repository =
        PostgresDocumentRepository::new(postgres_client, config.pipeline.collection())?;
    repository.ensure_collection().await?;

    let target_worker = TargetWorker::new(
        nats_client.create_consumer_client(),
        Arc::new(repository),
        TargetWorkerConfig {
            variant: config.pipeline,
            consumer: config.consumer_settings(),
            insert_timeout: config.insert_timeout(),
        },
    )
    .await?;

    Ok(Runner::new().with_named_process("target_worker", target_worker.into_runner_process()))
}

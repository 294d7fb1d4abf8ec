//! Aggregate scorer entry point.
//!
//! Wires the configuration, the liveness server, and the Kafka consumer
//! together, then runs until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use aggregate_scorer::{
    auth::M2mTokenProvider,
    config::ConfigLoader,
    consumer::{self, HealthState},
    gateway::HttpGateway,
    processor::Processor,
    server::run_server,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load().context("failed to load configuration")?;
    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "starting aggregate scorer");
    if let Ok(redacted) = config.redacted_json() {
        info!(config = %redacted, "loaded configuration");
    }

    let config = Arc::new(config);
    let tokens = Arc::new(M2mTokenProvider::new(config.auth.clone()));
    let gateway = HttpGateway::new(config.api.clone(), tokens);
    let processor = Processor::new(gateway, config.clone());

    let health = Arc::new(HealthState::default());
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(run_server(config.clone(), health.clone(), shutdown.clone()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let kafka_consumer = consumer::build_consumer(&config.kafka)?;
    let result = consumer::run(
        kafka_consumer,
        processor,
        &health,
        &config.kafka.topics,
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "liveness server exited with an error"),
        Err(err) => error!(error = %err, "liveness server task failed"),
    }

    result
}

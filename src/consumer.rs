//! Kafka consumer loop.
//!
//! At-least-once delivery: auto-commit is off and an offset is committed
//! only after `Processor::handle` returns `Ok`. Filtered-out events count as
//! handled and are committed so the group does not re-read them forever.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::config::KafkaConfig;
use crate::gateway::SubmissionGateway;
use crate::processor::Processor;
use crate::telemetry;

/// Broker connectivity flag shared with the health endpoint.
#[derive(Debug, Default)]
pub struct HealthState {
    connected: AtomicBool,
}

impl HealthState {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Build a stream consumer from the bus settings. TLS client credentials
/// are applied when both halves are present.
pub fn build_consumer(config: &KafkaConfig) -> anyhow::Result<StreamConsumer> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.url)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "latest");

    if let (Some(cert), Some(key)) = (&config.client_cert, &config.client_key) {
        client_config
            .set("security.protocol", "ssl")
            .set("ssl.certificate.pem", cert)
            .set("ssl.key.pem", key);
    }

    client_config
        .create()
        .context("failed to create Kafka consumer")
}

/// Consume until the shutdown token fires. Offsets are committed per message
/// once handling succeeds; on handler errors the offset is withheld so the
/// message is redelivered.
pub async fn run<G: SubmissionGateway>(
    consumer: StreamConsumer,
    processor: Processor<G>,
    health: &HealthState,
    topics: &[String],
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    consumer
        .subscribe(&topic_refs)
        .context("failed to subscribe to topics")?;
    info!(?topics, "consumer subscribed");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested, stopping consumer");
                health.set_connected(false);
                return Ok(());
            }
            received = consumer.recv() => {
                match received {
                    Err(err) => {
                        health.set_connected(false);
                        error!(error = %err, "failed to receive from broker");
                    }
                    Ok(message) => {
                        health.set_connected(true);
                        if handle_message(&processor, &message).await {
                            consumer
                                .commit_message(&message, CommitMode::Async)
                                .context("failed to commit offset")?;
                        }
                    }
                }
            }
        }
    }
}

/// Handle one delivery and decide whether its offset may be committed.
async fn handle_message<G: SubmissionGateway>(
    processor: &Processor<G>,
    message: &BorrowedMessage<'_>,
) -> bool {
    let trace_id = format!(
        "{}-{}-{}",
        message.topic(),
        message.partition(),
        message.offset()
    );

    async move {
        let payload = match message.payload() {
            Some(bytes) => bytes,
            None => {
                warn!("message has no payload");
                return false;
            }
        };

        let raw: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(raw) => raw,
            Err(err) => {
                error!(error = %err, "message body is not valid JSON");
                return false;
            }
        };

        // A body addressed to a different topic means a misrouted produce;
        // surface it rather than scoring against the wrong stream.
        if let Some(embedded) = raw.get("topic").and_then(serde_json::Value::as_str) {
            if embedded != message.topic() {
                error!(
                    embedded_topic = embedded,
                    "embedded topic does not match the delivery topic"
                );
                return false;
            }
        }

        match processor.handle(raw).await {
            Ok(true) => {
                info!("message handled, summation persisted");
                true
            }
            Ok(false) => {
                info!("message filtered out");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to handle message, offset withheld");
                false
            }
        }
    }
    .instrument(telemetry::message_span(&trace_id))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_starts_disconnected() {
        let health = HealthState::default();
        assert!(!health.is_connected());
        health.set_connected(true);
        assert!(health.is_connected());
        health.set_connected(false);
        assert!(!health.is_connected());
    }
}

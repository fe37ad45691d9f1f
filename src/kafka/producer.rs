use async_trait::async_trait;
use futures::future::join_all;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{BrokerClient, PendingMessage};
use crate::{config::KafkaConfig, Error, Result};

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("client.id", &config.client_id)
            .set("compression.type", &config.compression)
            .set("acks", &config.acks)
            .set("linger.ms", config.linger_ms.to_string())
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            // keeps per-partition order when librdkafka retries
            .set("enable.idempotence", config.idempotent().to_string());

        if let Some(tls) = &config.tls {
            client_config.set("security.protocol", "ssl");
            if let Some(cert) = &tls.client_cert {
                client_config.set("ssl.certificate.location", cert.display().to_string());
            }
            if let Some(key) = &tls.client_key {
                client_config.set("ssl.key.location", key.display().to_string());
            }
            if let Some(ca) = &tls.ca_location {
                client_config.set("ssl.ca.location", ca.display().to_string());
            }
        }

        let producer: FutureProducer = client_config.create().map_err(Error::Kafka)?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl BrokerClient for KafkaProducer {
    /// Enqueues every message in batch order, then waits for all delivery
    /// reports. The first failed delivery is returned.
    #[instrument(skip(self, batch), fields(topic = %self.topic, batch_size = batch.len()))]
    async fn send(&self, batch: &[PendingMessage], deadline: Duration) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let deliveries = batch.iter().map(|msg| {
            let record = FutureRecord::to(&self.topic)
                .key(&msg.key[..])
                .payload(&msg.value[..])
                .timestamp(msg.timestamp.timestamp_millis());
            self.producer.send(record, Timeout::After(deadline))
        });

        let results = tokio::time::timeout(deadline, join_all(deliveries))
            .await
            .map_err(|_| Error::Timeout {
                message: format!(
                    "delivery of {} messages to '{}' exceeded {:?}",
                    batch.len(),
                    self.topic,
                    deadline
                ),
            })?;

        let mut first_error = None;
        let mut failed = 0usize;
        for result in results {
            match result {
                Ok((partition, offset)) => {
                    debug!(partition, offset, "Message delivered");
                }
                Err((e, _)) => {
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!(failed, total = batch.len(), error = %e, "Batch partially failed");
                Err(Error::Kafka(e))
            }
            None => Ok(()),
        }
    }
}

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{info, instrument};

use crate::{config::KafkaConfig, Error, Result};

const ADMIN_TIMEOUT: Duration = Duration::from_secs(30);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates the relay's destination topic when it is missing.
pub struct TopicManager {
    admin_client: AdminClient<DefaultClientContext>,
    partitions: i32,
    replication_factor: i32,
}

impl TopicManager {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let admin_client: AdminClient<_> = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            admin_client,
            partitions: config.partitions,
            replication_factor: config.replication_factor,
        })
    }

    #[instrument(skip(self))]
    pub async fn ensure_topic_exists(&self, topic: &str) -> Result<()> {
        if self.topic_exists(topic)? {
            info!("Topic '{}' already exists", topic);
            return Ok(());
        }

        info!(
            partitions = self.partitions,
            replication_factor = self.replication_factor,
            "Creating topic '{}'",
            topic
        );
        let new_topic = NewTopic::new(
            topic,
            self.partitions,
            TopicReplication::Fixed(self.replication_factor),
        )
        .set("cleanup.policy", "delete");

        let opts = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));
        let results = self
            .admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(Error::Kafka)?;

        for result in results {
            match result {
                Ok(name) => info!("Created topic: {}", name),
                // another relay may have won the race
                Err((_, rdkafka::types::RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((_, code)) => return Err(Error::Kafka(KafkaError::AdminOp(code))),
            }
        }

        Ok(())
    }

    fn topic_exists(&self, topic: &str) -> Result<bool> {
        let metadata = self
            .admin_client
            .inner()
            .fetch_metadata(Some(topic), METADATA_TIMEOUT)
            .map_err(Error::Kafka)?;

        Ok(metadata
            .topics()
            .iter()
            .any(|t| t.name() == topic && t.error().is_none()))
    }
}

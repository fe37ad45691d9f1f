use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::KafkaConfig, Error, Result};

/// Logs every message on the relay topic, starting from the earliest offset,
/// until `cancel` fires or the consumer fails. Returns the number of messages
/// read.
pub async fn tail(config: &KafkaConfig, group_id: &str, cancel: CancellationToken) -> Result<u64> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("group.id", group_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .map_err(Error::Kafka)?;

    consumer.subscribe(&[config.topic.as_str()])?;
    info!(topic = %config.topic, group_id, "Tailing topic");

    let mut read = 0u64;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = consumer.recv() => match msg {
                Ok(m) => {
                    read += 1;
                    let key = m.key().map(String::from_utf8_lossy).unwrap_or_default();
                    let value = m.payload().map(String::from_utf8_lossy).unwrap_or_default();
                    info!(
                        partition = m.partition(),
                        offset = m.offset(),
                        key = %key,
                        msg = %value,
                        "Message"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Unable to read kafka message");
                    return Err(Error::Kafka(e));
                }
            }
        }
    }

    Ok(read)
}

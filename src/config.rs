use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kafka::{KeyStrategy, MessageFormat};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default)]
    pub create_topic: bool,
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// Client certificate authentication. Paths are handed to librdkafka.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub ca_location: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategyKind {
    #[default]
    Static,
    Table,
    PrimaryKey,
    None,
}

/// What happens to a batch the broker rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log and discard.
    #[default]
    Drop,
    /// Put the batch back in front of the buffer for the next flush.
    Requeue,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default)]
    pub key_strategy: KeyStrategyKind,
    #[serde(default = "default_static_key")]
    pub static_key: String,
    #[serde(default)]
    pub key_columns: Vec<usize>,
    #[serde(default)]
    pub format: MessageFormat,
    #[serde(default)]
    pub on_send_failure: FailurePolicy,
    #[serde(default)]
    pub checkpoint_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            key_strategy: KeyStrategyKind::default(),
            static_key: default_static_key(),
            key_columns: Vec::new(),
            format: MessageFormat::default(),
            on_send_failure: FailurePolicy::default(),
            checkpoint_file: None,
        }
    }
}

impl Config {
    /// Loads `path` and overlays `BINLOG_RELAY_*` environment variables,
    /// e.g. `BINLOG_RELAY_KAFKA__BROKERS=a:9092,b:9092`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BINLOG_RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config("kafka.brokers must not be empty".to_string()));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(Error::Config("kafka.topic must not be empty".to_string()));
        }
        if !matches!(self.kafka.acks.as_str(), "all" | "-1" | "0" | "1") {
            return Err(Error::Config(format!(
                "kafka.acks must be one of all, -1, 0 or 1, got '{}'",
                self.kafka.acks
            )));
        }
        if let Some(tls) = &self.kafka.tls {
            if tls.client_cert.is_some() != tls.client_key.is_some() {
                return Err(Error::Config(
                    "kafka.tls.client_cert and kafka.tls.client_key must be set together"
                        .to_string(),
                ));
            }
        }
        self.relay.validate()
    }
}

impl KafkaConfig {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Idempotent delivery needs acknowledgement from every in-sync replica,
    /// so it is only enabled for `acks = "all"` (or `-1`).
    pub fn idempotent(&self) -> bool {
        matches!(self.acks.as_str(), "all" | "-1")
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_ms == 0 {
            return Err(Error::Config(
                "relay.flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(Error::Config(
                "relay.send_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.key_strategy == KeyStrategyKind::PrimaryKey && self.key_columns.is_empty() {
            return Err(Error::Config(
                "relay.key_columns is required for the primary_key strategy".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        match self.key_strategy {
            KeyStrategyKind::Static => KeyStrategy::Static(self.static_key.clone()),
            KeyStrategyKind::Table => KeyStrategy::Table,
            KeyStrategyKind::PrimaryKey => KeyStrategy::PrimaryKey(self.key_columns.clone()),
            KeyStrategyKind::None => KeyStrategy::None,
        }
    }
}

fn default_client_id() -> String {
    "binlog-relay".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    100
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_partitions() -> i32 {
    3
}

fn default_replication_factor() -> i32 {
    1
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_static_key() -> String {
    crate::kafka::key_strategy::DEFAULT_STATIC_KEY.to_string()
}

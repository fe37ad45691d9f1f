use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::Result;

/// A keyed broker message waiting in the relay buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: Utc::now(),
        }
    }

    /// Value as text, for logs and assertions.
    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Transmits batches of messages to a broker.
///
/// Partitioning, transport retries and connection management belong to the
/// implementation. Callers may pass an empty batch.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn send(&self, batch: &[PendingMessage], deadline: Duration) -> Result<()>;
}

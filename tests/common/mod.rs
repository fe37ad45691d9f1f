#![allow(dead_code)]

use async_trait::async_trait;
use binlog_relay::capture::{RowAction, RowsEvent};
use binlog_relay::config::{FailurePolicy, RelayConfig};
use binlog_relay::kafka::{BrokerClient, PendingMessage};
use binlog_relay::{BatchingRelay, Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Broker double that records every batch it is given.
#[derive(Default)]
pub struct MemoryBroker {
    batches: Mutex<Vec<Vec<PendingMessage>>>,
    send_calls: AtomicUsize,
    failing: AtomicBool,
    /// Simulated network latency per send
    latency: Mutex<Option<Duration>>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Batches that were delivered successfully.
    pub fn batches(&self) -> Vec<Vec<PendingMessage>> {
        self.batches.lock().clone()
    }

    pub fn delivered_values(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|m| m.value_str().into_owned())
            .collect()
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn send(&self, batch: &[PendingMessage], _deadline: Duration) -> Result<()> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Timeout {
                message: "broker unavailable".to_string(),
            });
        }

        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}

pub fn relay_config() -> RelayConfig {
    RelayConfig {
        flush_interval_ms: 100,
        send_timeout_ms: 1_000,
        ..RelayConfig::default()
    }
}

pub fn create_relay(broker: &Arc<MemoryBroker>) -> Arc<BatchingRelay> {
    create_relay_with(broker, relay_config())
}

pub fn create_relay_with(broker: &Arc<MemoryBroker>, config: RelayConfig) -> Arc<BatchingRelay> {
    let broker: Arc<dyn BrokerClient> = broker.clone();
    Arc::new(BatchingRelay::new(broker, &config).unwrap())
}

pub fn requeue_config() -> RelayConfig {
    RelayConfig {
        on_send_failure: FailurePolicy::Requeue,
        ..relay_config()
    }
}

pub fn row_event(action: RowAction, row: &str) -> RowsEvent {
    RowsEvent::new("shop", "orders", action, vec![vec![row.into()]])
}

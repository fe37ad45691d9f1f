//! Buffers row mutations and ships them to the broker on a timer.
//!
//! The capture engine appends through [`EventHandler::on_row_mutation`], which
//! only takes the buffer lock long enough to push one message. A flush swaps
//! the whole buffer out under the same lock and performs the network send
//! after releasing it, so a slow broker never stalls the capture engine.
//!
//! # Example
//!
//! ```rust,no_run
//! use binlog_relay::config::Config;
//! use binlog_relay::kafka::KafkaProducer;
//! use binlog_relay::relay::BatchingRelay;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(config: Config) -> binlog_relay::Result<()> {
//! let producer = Arc::new(KafkaProducer::new(&config.kafka)?);
//! let relay = Arc::new(BatchingRelay::new(producer, &config.relay)?);
//!
//! let cancel = CancellationToken::new();
//! let handle = relay.start_auto_flush(config.relay.flush_interval(), cancel.clone())?;
//!
//! // ... hand `relay` to the capture engine ...
//!
//! cancel.cancel();
//! handle.await.ok();
//! relay.flush(config.relay.send_timeout()).await;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{GtidSet, Position, QueryEvent, RotateEvent, RowsEvent};
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::{FailurePolicy, RelayConfig};
use crate::handler::EventHandler;
use crate::kafka::{BrokerClient, MessageShaper, PendingMessage};
use crate::{Error, Result};

/// Outcome of one flush. `sent` is the batch handed to the broker, whether or
/// not delivery succeeded.
#[derive(Debug)]
pub struct FlushResult {
    pub sent: Vec<PendingMessage>,
    pub error: Option<Error>,
}

impl FlushResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Flushes that found a non-empty buffer
    pub flushes: u64,
    pub messages_sent: u64,
    pub batches_failed: u64,
    pub messages_dropped: u64,
}

#[derive(Default)]
struct Counters {
    flushes: AtomicU64,
    messages_sent: AtomicU64,
    batches_failed: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Everything swapped out together by a flush.
#[derive(Default)]
struct Pending {
    messages: Vec<PendingMessage>,
    /// Latest position handed to `on_position_sync` since the last swap.
    position: Option<Position>,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BatchingRelay {
    broker: Arc<dyn BrokerClient>,
    shaper: MessageShaper,
    pending: Mutex<Pending>,
    // serializes flushes so batch N finishes before batch N+1 starts
    flush_lock: tokio::sync::Mutex<()>,
    send_timeout: Duration,
    failure_policy: FailurePolicy,
    checkpoints: Option<CheckpointManager>,
    auto_flush_running: AtomicBool,
    closed: AtomicBool,
    counters: Counters,
}

impl BatchingRelay {
    pub fn new(broker: Arc<dyn BrokerClient>, config: &RelayConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            broker,
            shaper: MessageShaper::new(config.key_strategy(), config.format),
            pending: Mutex::new(Pending::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            send_timeout: config.send_timeout(),
            failure_policy: config.on_send_failure,
            checkpoints: config.checkpoint_file.as_ref().map(CheckpointManager::new),
            auto_flush_running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn checkpoints(&self) -> Option<&CheckpointManager> {
        self.checkpoints.as_ref()
    }

    /// Spawns the periodic flush task. It flushes once per `period` until
    /// `cancel` fires; a send in progress at that moment runs to completion or
    /// to its deadline. Only one loop may run per relay.
    pub fn start_auto_flush(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        if period.is_zero() {
            return Err(Error::Config(
                "flush period must be greater than zero".to_string(),
            ));
        }
        if self.auto_flush_running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        let relay = Arc::clone(self);
        Ok(tokio::spawn(async move {
            // released on abort or panic as well as on cancellation
            let _running = RunningGuard(&relay.auto_flush_running);
            relay.auto_flush_loop(period, cancel).await;
        }))
    }

    async fn auto_flush_loop(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "Starting auto flush");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Stopping auto flush");
                    break;
                }
                _ = ticker.tick() => {
                    self.flush(self.send_timeout).await;
                }
            }
        }
    }

    /// Takes the whole buffer and sends it, waiting at most `deadline`.
    ///
    /// The buffer is empty when this returns unless the requeue policy put a
    /// failed batch back. An empty buffer returns immediately without
    /// touching the broker.
    pub async fn flush(&self, deadline: Duration) -> FlushResult {
        let (result, checkpoint) = self.flush_batch(deadline).await;
        if let Err(e) = checkpoint {
            error!(error = %e, "Failed to persist checkpoint");
        }
        result
    }

    async fn flush_batch(&self, deadline: Duration) -> (FlushResult, Result<()>) {
        let _serial = self.flush_lock.lock().await;

        let (batch, position) = {
            let mut pending = self.pending.lock();
            (
                std::mem::take(&mut pending.messages),
                pending.position.take(),
            )
        };

        if batch.is_empty() {
            // nothing in flight; everything before `position` was already sent
            let checkpoint = match position {
                Some(pos) => self.persist(pos).await,
                None => Ok(()),
            };
            return (
                FlushResult {
                    sent: batch,
                    error: None,
                },
                checkpoint,
            );
        }

        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        let batch_size = batch.len();

        let error = match tokio::time::timeout(deadline, self.broker.send(&batch, deadline)).await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(Error::Timeout {
                message: format!("send of {} messages exceeded {:?}", batch_size, deadline),
            }),
        };

        let checkpoint = match &error {
            None => {
                self.counters
                    .messages_sent
                    .fetch_add(batch_size as u64, Ordering::Relaxed);
                debug!(batch_size, "Flushed batch");
                match position {
                    Some(pos) => self.persist(pos).await,
                    None => Ok(()),
                }
            }
            Some(e) => {
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                match self.failure_policy {
                    FailurePolicy::Drop => {
                        self.counters
                            .messages_dropped
                            .fetch_add(batch_size as u64, Ordering::Relaxed);
                        warn!(batch_size, error = %e, "Send failed, dropping batch");
                    }
                    FailurePolicy::Requeue => {
                        warn!(batch_size, error = %e, "Send failed, requeueing batch");
                        self.requeue(batch.clone(), position);
                    }
                }
                Ok(())
            }
        };

        (FlushResult { sent: batch, error }, checkpoint)
    }

    /// Puts `batch` back ahead of anything appended while it was in flight.
    fn requeue(&self, batch: Vec<PendingMessage>, position: Option<Position>) {
        let mut pending = self.pending.lock();
        let newer = std::mem::replace(&mut pending.messages, batch);
        pending.messages.extend(newer);
        if pending.position.is_none() {
            pending.position = position;
        }
    }

    async fn persist(&self, position: Position) -> Result<()> {
        let Some(checkpoints) = &self.checkpoints else {
            trace!(pos = %position, "No checkpoint file configured");
            return Ok(());
        };

        let count = self.counters.messages_sent.load(Ordering::Relaxed);
        checkpoints.save(&Checkpoint::new(position, count)).await
    }

    /// Stops accepting row mutations. Already buffered messages stay until
    /// the next flush.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(pending = self.pending_len(), "Relay closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().messages.len()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
            messages_dropped: self.counters.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl EventHandler for BatchingRelay {
    async fn on_stream_rotated(&self, rotate: &RotateEvent) -> Result<()> {
        debug!(next_log_name = %rotate.next_log_name, "Rotation event");
        Ok(())
    }

    async fn on_schema_changed(&self, _schema: &str, _table: &str) -> Result<()> {
        Ok(())
    }

    async fn on_ddl(&self, _next_pos: &Position, _query: &QueryEvent) -> Result<()> {
        Ok(())
    }

    async fn on_row_mutation(&self, event: &RowsEvent) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Shutdown);
        }

        let msg = self.shaper.shape(event)?;
        self.pending.lock().messages.push(msg);
        Ok(())
    }

    // Batches are time-aligned; commit boundaries are not used to group them.
    async fn on_transaction_commit(&self, next_pos: &Position) -> Result<()> {
        trace!(pos = %next_pos, "Commit");
        Ok(())
    }

    async fn on_gtid(&self, gtid: &GtidSet) -> Result<()> {
        trace!(gtid = %gtid, "GTID");
        Ok(())
    }

    /// Records `pos` for the next flush. With `force` the buffer is flushed
    /// right away and the position persisted before returning.
    ///
    /// A failed send still returns `Ok`: the position is left unacknowledged
    /// and only a checkpoint write error is reported. Under
    /// [`FailurePolicy::Drop`] the batch and the position are discarded; use
    /// [`FailurePolicy::Requeue`] to keep both for the next flush.
    async fn on_position_sync(&self, pos: &Position, force: bool) -> Result<()> {
        self.pending.lock().position = Some(pos.clone());

        if !force {
            return Ok(());
        }

        let (result, checkpoint) = self.flush_batch(self.send_timeout).await;
        if let Some(e) = &result.error {
            warn!(pos = %pos, error = %e, "Forced position sync without delivery");
        }
        checkpoint
    }

    fn identity(&self) -> &str {
        "kafka-relay"
    }
}

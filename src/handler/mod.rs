//! The callback surface the capture engine drives.
//!
//! Every notification the binlog reader can produce has a matching method on
//! [`EventHandler`]. Implementations decide what to do with each one: the
//! [`LoggingHandler`] only records them, the
//! [`BatchingRelay`](crate::relay::BatchingRelay) buffers row mutations for
//! delivery to Kafka.
//!
//! An `Err` from any callback tells the capture engine to stop; retrying or
//! rewinding the stream is the capture engine's decision.

pub mod logging;

use async_trait::async_trait;

use crate::capture::{ChangeEvent, GtidSet, Position, QueryEvent, RotateEvent, RowsEvent};
use crate::Result;

pub use logging::LoggingHandler;

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The binlog file was rotated because the previous one filled up.
    async fn on_stream_rotated(&self, rotate: &RotateEvent) -> Result<()>;

    /// The structure of `schema.table` changed.
    async fn on_schema_changed(&self, schema: &str, table: &str) -> Result<()>;

    /// A DDL statement was executed; `next_pos` is the position after it.
    async fn on_ddl(&self, next_pos: &Position, query: &QueryEvent) -> Result<()>;

    /// Rows were inserted, updated or deleted. Called far more often than
    /// anything else, so implementations must return quickly.
    async fn on_row_mutation(&self, event: &RowsEvent) -> Result<()>;

    /// A transaction committed; `next_pos` is the position after the commit.
    async fn on_transaction_commit(&self, next_pos: &Position) -> Result<()>;

    /// A global transaction identifier was assigned.
    async fn on_gtid(&self, gtid: &GtidSet) -> Result<()>;

    /// The capture engine asks for `pos` to be persisted. With `force` set the
    /// position must be acknowledged before this returns.
    async fn on_position_sync(&self, pos: &Position, force: bool) -> Result<()>;

    /// Stable name used in diagnostics.
    fn identity(&self) -> &str;

    /// Routes a [`ChangeEvent`] to the matching callback.
    async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        match event {
            ChangeEvent::Rotate(rotate) => self.on_stream_rotated(rotate).await,
            ChangeEvent::TableChanged { schema, table } => {
                self.on_schema_changed(schema, table).await
            }
            ChangeEvent::Ddl { position, query } => self.on_ddl(position, query).await,
            ChangeEvent::Rows(rows) => self.on_row_mutation(rows).await,
            ChangeEvent::Xid { position } => self.on_transaction_commit(position).await,
            ChangeEvent::Gtid { gtid } => self.on_gtid(gtid).await,
            ChangeEvent::PosSynced { position, force } => {
                self.on_position_sync(position, *force).await
            }
        }
    }
}

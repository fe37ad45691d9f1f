use async_trait::async_trait;
use tracing::info;

use super::EventHandler;
use crate::capture::{GtidSet, Position, QueryEvent, RotateEvent, RowsEvent};
use crate::Result;

/// Records every callback at info level and never fails.
#[derive(Debug, Default, Clone)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn on_stream_rotated(&self, rotate: &RotateEvent) -> Result<()> {
        info!(
            next_log_name = %rotate.next_log_name,
            position = rotate.position,
            "Rotation event"
        );
        Ok(())
    }

    async fn on_schema_changed(&self, schema: &str, table: &str) -> Result<()> {
        info!(schema, table, "Schema change");
        Ok(())
    }

    async fn on_ddl(&self, next_pos: &Position, query: &QueryEvent) -> Result<()> {
        info!(pos = %next_pos, schema = %query.schema, query = %query.query, "DDL event");
        Ok(())
    }

    async fn on_row_mutation(&self, event: &RowsEvent) -> Result<()> {
        info!(
            schema = %event.schema,
            table = %event.table,
            action = %event.action,
            rows = event.rows.len(),
            event = %event,
            "Row event"
        );
        Ok(())
    }

    async fn on_transaction_commit(&self, next_pos: &Position) -> Result<()> {
        info!(position = %next_pos, "XID event");
        Ok(())
    }

    async fn on_gtid(&self, gtid: &GtidSet) -> Result<()> {
        info!(gtid = %gtid, "GTID event");
        Ok(())
    }

    async fn on_position_sync(&self, pos: &Position, force: bool) -> Result<()> {
        info!(pos = %pos, force, "Position synced");
        Ok(())
    }

    fn identity(&self) -> &str {
        "logging"
    }
}

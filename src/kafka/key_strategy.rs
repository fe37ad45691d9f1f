use crate::capture::{ColumnValue, RowsEvent};
use tracing::{debug, warn};

pub const DEFAULT_STATIC_KEY: &str = "shard:GTID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Every message carries the same key.
    Static(String),
    /// `schema.table`
    Table,
    /// Values of the given column indexes of the identifying row image,
    /// joined with `:`.
    PrimaryKey(Vec<usize>),
    None,
}

impl KeyStrategy {
    pub fn extract_key(&self, event: &RowsEvent) -> Option<String> {
        match self {
            KeyStrategy::Static(key) => Some(key.clone()),

            KeyStrategy::Table => Some(format!("{}.{}", event.schema, event.table)),

            KeyStrategy::PrimaryKey(columns) => match event.key_row() {
                Some(row) => extract_composite_key(row, columns),
                None => {
                    warn!(
                        schema = %event.schema,
                        table = %event.table,
                        "No row image available for key extraction"
                    );
                    None
                }
            },

            KeyStrategy::None => None,
        }
    }
}

fn column_text(value: &ColumnValue) -> Option<String> {
    match value {
        ColumnValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn extract_composite_key(row: &[ColumnValue], columns: &[usize]) -> Option<String> {
    let mut key_parts = Vec::with_capacity(columns.len());

    for &idx in columns {
        match row.get(idx).and_then(column_text) {
            Some(part) => key_parts.push(part),
            None => {
                debug!("Missing or null column {} for key", idx);
                return None;
            }
        }
    }

    if key_parts.is_empty() {
        None
    } else {
        Some(key_parts.join(":"))
    }
}

impl Default for KeyStrategy {
    fn default() -> Self {
        KeyStrategy::Static(DEFAULT_STATIC_KEY.to_string())
    }
}

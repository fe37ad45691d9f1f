use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A binlog coordinate: file name plus byte offset within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub name: String,
    pub pos: u32,
}

impl Position {
    pub fn new(name: impl Into<String>, pos: u32) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.pos)
    }
}

/// Emitted when the server switches to a new binlog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateEvent {
    pub next_log_name: String,
    pub position: u64,
}

/// A statement event carrying DDL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEvent {
    #[serde(default)]
    pub schema: String,
    pub query: String,
}

/// A global transaction identifier set, kept in its textual form
/// (`uuid:1-10,uuid2:1-3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GtidSet(pub String);

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowAction::Insert => "insert",
            RowAction::Update => "update",
            RowAction::Delete => "delete",
        })
    }
}

/// A single column value from a row image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Binary(BinaryValue),
}

/// Raw bytes, carried in JSON as `{"$binary": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryValue {
    #[serde(rename = "$binary", with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => f.write_str("NULL"),
            ColumnValue::Bool(b) => write!(f, "{}", b),
            ColumnValue::Int(i) => write!(f, "{}", i),
            ColumnValue::Float(v) => write!(f, "{}", v),
            ColumnValue::Text(s) => f.write_str(s),
            ColumnValue::Binary(b) => f.write_str(&STANDARD.encode(&b.bytes)),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Text(s.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(s: String) -> Self {
        ColumnValue::Text(s)
    }
}

impl From<i64> for ColumnValue {
    fn from(i: i64) -> Self {
        ColumnValue::Int(i)
    }
}

impl From<bool> for ColumnValue {
    fn from(b: bool) -> Self {
        ColumnValue::Bool(b)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(bytes: Vec<u8>) -> Self {
        ColumnValue::Binary(BinaryValue { bytes })
    }
}

pub type Row = Vec<ColumnValue>;

/// A row mutation affecting one or more rows of a single table.
///
/// For updates, `rows` holds before/after image pairs:
/// `[before_1, after_1, before_2, after_2, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsEvent {
    pub schema: String,
    pub table: String,
    pub action: RowAction,
    pub rows: Vec<Row>,
}

impl RowsEvent {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        action: RowAction,
        rows: Vec<Row>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            action,
            rows,
        }
    }

    /// The row image that identifies the affected row: the after-image for
    /// updates, the only image otherwise.
    pub fn key_row(&self) -> Option<&Row> {
        match self.action {
            RowAction::Update => self.rows.get(1).or_else(|| self.rows.first()),
            RowAction::Insert | RowAction::Delete => self.rows.first(),
        }
    }
}

struct RowsDisplay<'a>(&'a [Row]);

impl fmt::Display for RowsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str("[")?;
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", value)?;
            }
            f.write_str("]")?;
        }
        f.write_str("]")
    }
}

/// Renders as `<action> [[v1 v2] [v1 v2]]`.
impl fmt::Display for RowsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, RowsDisplay(&self.rows))
    }
}

/// Every notification the capture engine can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Rotate(RotateEvent),
    TableChanged { schema: String, table: String },
    Ddl { position: Position, query: QueryEvent },
    Rows(RowsEvent),
    Xid { position: Position },
    Gtid { gtid: GtidSet },
    PosSynced { position: Position, force: bool },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Rotate(_) => "rotate",
            ChangeEvent::TableChanged { .. } => "table_changed",
            ChangeEvent::Ddl { .. } => "ddl",
            ChangeEvent::Rows(_) => "rows",
            ChangeEvent::Xid { .. } => "xid",
            ChangeEvent::Gtid { .. } => "gtid",
            ChangeEvent::PosSynced { .. } => "pos_synced",
        }
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_event_text_rendering() {
        let event = RowsEvent::new(
            "shop",
            "orders",
            RowAction::Insert,
            vec![
                vec![1i64.into(), "alice".into()],
                vec![2i64.into(), ColumnValue::Null],
            ],
        );

        assert_eq!(event.to_string(), "insert [[1 alice] [2 NULL]]");
    }

    #[test]
    fn test_key_row_uses_after_image_for_updates() {
        let event = RowsEvent::new(
            "shop",
            "orders",
            RowAction::Update,
            vec![vec![1i64.into(), "old".into()], vec![1i64.into(), "new".into()]],
        );

        assert_eq!(event.key_row(), Some(&vec![1i64.into(), "new".into()]));
    }

    #[test]
    fn test_change_event_from_json() {
        let line = r#"{"type":"rows","schema":"shop","table":"orders","action":"delete","rows":[[7,"x",null,1.5,true]]}"#;
        let event: ChangeEvent = serde_json::from_str(line).unwrap();

        match event {
            ChangeEvent::Rows(rows) => {
                assert_eq!(rows.action, RowAction::Delete);
                assert_eq!(
                    rows.rows[0],
                    vec![
                        ColumnValue::Int(7),
                        ColumnValue::Text("x".to_string()),
                        ColumnValue::Null,
                        ColumnValue::Float(1.5),
                        ColumnValue::Bool(true),
                    ]
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_binary_column_json() {
        let value: ColumnValue = vec![0xdeu8, 0xad, 0xbe, 0xef].into();
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"$binary":"3q2+7w=="}"#);

        let parsed: ColumnValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_position_sync_event_from_json() {
        let line = r#"{"type":"pos_synced","position":{"name":"mysql-bin.000003","pos":4},"force":true}"#;
        let event: ChangeEvent = serde_json::from_str(line).unwrap();

        assert_eq!(
            event,
            ChangeEvent::PosSynced {
                position: Position::new("mysql-bin.000003", 4),
                force: true,
            }
        );
        assert_eq!(event.kind(), "pos_synced");
    }
}

pub mod capture;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod handler;
pub mod relay;

pub mod kafka;

pub use config::Config;
pub use error::{Error, Result};
pub use handler::{EventHandler, LoggingHandler};
pub use relay::{BatchingRelay, FlushResult, RelayStats};

/// Log filter used when neither `RUST_LOG` nor `--verbose` is given.
pub const DEFAULT_LOG_FILTER: &str = "binlog_relay=info,warn";

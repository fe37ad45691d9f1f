//! Error types and result handling for binlog-relay.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use binlog_relay::{Error, Result};
//!
//! fn append_row() -> Result<()> {
//!     // The relay refuses new rows once it has been closed
//!     Err(Error::Shutdown)
//! }
//!
//! match append_row() {
//!     Ok(()) => println!("Buffered"),
//!     Err(Error::Shutdown) => eprintln!("Relay is shutting down"),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for binlog-relay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value, detected at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file or environment could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// Kafka client, producer or delivery error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON encoding or decoding error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from checkpoint files or the event input.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A change event that could not be parsed.
    #[error("Invalid message format: {message}")]
    InvalidMessage {
        /// Description of what was invalid
        message: String,
    },

    /// A broker send did not finish before its deadline.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// An auto-flush loop is already running for this relay.
    #[error("Auto flush already running")]
    AlreadyRunning,

    /// The relay has been closed and no longer accepts events.
    #[error("Shutdown requested")]
    Shutdown,
}

/// A convenient Result type alias for binlog-relay operations.
///
/// This is equivalent to `std::result::Result<T, binlog_relay::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

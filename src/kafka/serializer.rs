use serde::{Deserialize, Serialize};

use super::{KeyStrategy, PendingMessage};
use crate::{capture::RowsEvent, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// `<action> [[v1 v2] ...]`
    #[default]
    Text,
    /// The whole row event as JSON.
    Json,
}

/// Turns row mutations into keyed broker messages.
#[derive(Debug, Clone, Default)]
pub struct MessageShaper {
    key_strategy: KeyStrategy,
    format: MessageFormat,
}

impl MessageShaper {
    pub fn new(key_strategy: KeyStrategy, format: MessageFormat) -> Self {
        Self {
            key_strategy,
            format,
        }
    }

    pub fn shape(&self, event: &RowsEvent) -> Result<PendingMessage> {
        let key = self.key_strategy.extract_key(event).unwrap_or_default();
        let value = match self.format {
            MessageFormat::Text => event.to_string().into_bytes(),
            MessageFormat::Json => serde_json::to_vec(event)?,
        };

        Ok(PendingMessage::new(key, value))
    }
}

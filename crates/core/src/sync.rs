// crates/core/src/sync.rs
//! Wire-facing sync message type.
//!
//! Clients send camelCase; older CLI builds send snake_case. Serde aliases
//! accept both. The calendar date of a message is whatever precedes the
//! `T` in its timestamp; the client's local-date choice is authoritative,
//! no timezone math is applied server-side.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::CoreError;
use crate::pricing::TokenCounts;

pub const MAX_MESSAGE_ID_LEN: usize = 100;
pub const MAX_MODEL_LEN: usize = 100;
pub const MAX_SOURCE_LEN: usize = 50;
pub const MAX_MACHINE_ID_LEN: usize = 50;

/// One client-reported AI interaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub id: String,
    /// RFC3339 timestamp as sent by the client; only the date prefix is used.
    pub timestamp: String,
    pub model: String,
    #[serde(default, alias = "input_tokens")]
    pub input_tokens: i64,
    #[serde(default, alias = "output_tokens")]
    pub output_tokens: i64,
    #[serde(default, alias = "cache_read_tokens")]
    pub cache_read_tokens: i64,
    #[serde(
        default,
        rename = "cacheCreationTokens",
        alias = "cache_creation_tokens",
        alias = "cache_write_tokens"
    )]
    pub cache_write_tokens: i64,
    #[serde(default, alias = "reasoning_tokens")]
    pub reasoning_tokens: i64,
}

impl SyncMessage {
    pub fn counts(&self) -> TokenCounts {
        TokenCounts {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_tokens,
            cache_write_tokens: self.cache_write_tokens,
            reasoning_tokens: self.reasoning_tokens,
        }
    }

    /// Calendar date: the substring before `T` (or the whole string for a
    /// bare date), parsed as YYYY-MM-DD.
    pub fn date(&self) -> Result<NaiveDate, CoreError> {
        let prefix = self.timestamp.split('T').next().unwrap_or_default();
        prefix
            .parse()
            .map_err(|_| CoreError::InvalidTimestamp(self.timestamp.clone()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.is_empty() || self.id.len() > MAX_MESSAGE_ID_LEN {
            return Err(CoreError::InvalidField {
                field: "id",
                reason: format!("must be 1-{MAX_MESSAGE_ID_LEN} characters"),
            });
        }
        if self.model.trim().is_empty() || self.model.len() > MAX_MODEL_LEN {
            return Err(CoreError::InvalidField {
                field: "model",
                reason: format!("must be 1-{MAX_MODEL_LEN} characters"),
            });
        }
        self.counts().validate()?;
        self.date().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_camel_case() {
        let msg: SyncMessage = serde_json::from_str(
            r#"{"id":"m1","timestamp":"2024-06-15T10:30:00Z","model":"claude-3-5-sonnet-20241022",
                "inputTokens":1000,"outputTokens":500,"cacheReadTokens":10,
                "cacheCreationTokens":20,"reasoningTokens":5}"#,
        )
        .unwrap();
        assert_eq!(msg.input_tokens, 1000);
        assert_eq!(msg.cache_write_tokens, 20);
    }

    #[test]
    fn accepts_snake_case_aliases() {
        let msg: SyncMessage = serde_json::from_str(
            r#"{"id":"m1","timestamp":"2024-06-15T10:30:00Z","model":"gpt-4o",
                "input_tokens":7,"output_tokens":3,"cache_write_tokens":2}"#,
        )
        .unwrap();
        assert_eq!(msg.input_tokens, 7);
        assert_eq!(msg.cache_write_tokens, 2);
        assert_eq!(msg.reasoning_tokens, 0);
    }

    #[test]
    fn date_is_the_prefix_before_t() {
        let msg: SyncMessage = serde_json::from_str(
            r#"{"id":"m1","timestamp":"2024-06-15T23:59:59-07:00","model":"gpt-4o"}"#,
        )
        .unwrap();
        assert_eq!(msg.date().unwrap(), "2024-06-15".parse().unwrap());
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let msg: SyncMessage =
            serde_json::from_str(r#"{"id":"m1","timestamp":"not-a-date","model":"gpt-4o"}"#)
                .unwrap();
        assert!(matches!(msg.validate(), Err(CoreError::InvalidTimestamp(_))));
    }

    #[test]
    fn negative_counter_is_rejected() {
        let msg: SyncMessage = serde_json::from_str(
            r#"{"id":"m1","timestamp":"2024-06-15T00:00:00Z","model":"gpt-4o","inputTokens":-5}"#,
        )
        .unwrap();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn oversized_id_is_rejected() {
        let long = "x".repeat(101);
        let msg: SyncMessage = serde_json::from_str(&format!(
            r#"{{"id":"{long}","timestamp":"2024-06-15T00:00:00Z","model":"gpt-4o"}}"#
        ))
        .unwrap();
        assert!(msg.validate().is_err());
    }
}

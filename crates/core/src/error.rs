// crates/core/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("negative token count for {field}: {value}")]
    NegativeTokens { field: &'static str, value: i64 },

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("unknown period: {0:?} (expected one of: all, month, week)")]
    UnknownPeriod(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

// crates/core/src/period.rs
//! Leaderboard / benchmark time windows.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Time window for rankings and community statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    All,
    Month,
    Week,
}

impl Period {
    pub const ALL_PERIODS: [Period; 3] = [Period::All, Period::Month, Period::Week];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::All => "all",
            Period::Month => "month",
            Period::Week => "week",
        }
    }

    /// Inclusive date cutoff relative to `today`; `None` means unbounded.
    pub fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::All => None,
            Period::Month => Some(today - Duration::days(30)),
            Period::Week => Some(today - Duration::days(7)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Period::All),
            "month" => Ok(Period::Month),
            "week" => Ok(Period::Week),
            other => Err(CoreError::UnknownPeriod(other.to_string())),
        }
    }
}

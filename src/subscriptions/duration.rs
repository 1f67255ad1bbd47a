//! Plan duration codes.
//!
//! A duration code is a whole number of months followed by `M`, e.g. `"1M"`,
//! `"3M"`, `"6M"`, `"12M"`. The general `^(\d+)M$` shape is accepted; zero
//! months is not.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on a single subscription period (ten years).
const MAX_MONTHS: u32 = 120;

/// A validated number of months.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanDuration {
    months: u32,
}

/// Error returned when a duration code is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDurationError {
    code: String,
}

impl ParseDurationError {
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ParseDurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid plan duration '{}': use '1M', '3M', '6M' or '12M'",
            self.code
        )
    }
}

impl std::error::Error for ParseDurationError {}

impl PlanDuration {
    /// Duration of `months` months. Returns `None` for zero or absurdly long periods.
    #[must_use]
    pub fn from_months(months: u32) -> Option<Self> {
        (1..=MAX_MONTHS).contains(&months).then_some(Self { months })
    }

    #[must_use]
    pub fn months(&self) -> u32 {
        self.months
    }

    /// The canonical code, e.g. `"3M"`.
    #[must_use]
    pub fn code(&self) -> String {
        format!("{}M", self.months)
    }

    /// End of a period starting at `start`.
    ///
    /// Day-of-month is clamped: a period starting Jan 31 with `1M` ends on the
    /// last day of February.
    #[must_use]
    pub fn period_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_months(Months::new(self.months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl FromStr for PlanDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDurationError {
            code: s.to_string(),
        };

        let digits = s.strip_suffix('M').ok_or_else(err)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let months: u32 = digits.parse().map_err(|_| err())?;
        Self::from_months(months).ok_or_else(err)
    }
}

impl TryFrom<String> for PlanDuration {
    type Error = ParseDurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlanDuration> for String {
    fn from(value: PlanDuration) -> Self {
        value.code()
    }
}

impl fmt::Display for PlanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}M", self.months)
    }
}

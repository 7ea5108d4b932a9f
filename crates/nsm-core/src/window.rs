//! Trailing reporting windows for analytics queries.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of trailing days an analytics query covers.
///
/// Usage rows are filtered by calendar date (`date_key >= today - days`);
/// monitoring events by instant (`event_timestamp >= now - days`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct LookbackDays(u16);

impl LookbackDays {
    /// Window used when a request omits `days`.
    pub const DEFAULT: u16 = 30;
    /// Largest accepted window (ten years).
    pub const MAX: u16 = 3650;

    /// Validate a window length in days.
    pub fn new(days: i64) -> Result<Self, ValidationError> {
        u16::try_from(days)
            .ok()
            .filter(|d| (1..=Self::MAX).contains(d))
            .map(Self)
            .ok_or(ValidationError::LookbackOutOfRange {
                max: Self::MAX,
                value: days,
            })
    }

    /// Window length in days.
    pub fn days(self) -> i32 {
        i32::from(self.0)
    }
}

impl Default for LookbackDays {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<i64> for LookbackDays {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LookbackDays> for i64 {
    fn from(window: LookbackDays) -> Self {
        i64::from(window.0)
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// An inclusive date range, interpreted in the account's reporting
/// timezone (KST for the Naver SearchAd platform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidDateRange(format!(
                "end {} precedes start {}",
                end, start
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Number of days covered, counting both endpoints. Never below 1 so
    /// day-normalized metrics cannot divide by zero.
    pub fn inclusive_days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(1)
    }

    /// Iterate every date in the range, oldest first.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let count = self.inclusive_days() as usize;
        (0..count).filter_map(move |offset| {
            start.checked_add_days(chrono::Days::new(offset as u64))
        })
    }
}

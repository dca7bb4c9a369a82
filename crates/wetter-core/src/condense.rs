//! Condensation of raw samples into hourly and daily averages.
//!
//! All boundaries are plain UTC arithmetic on unix seconds. No timezone is
//! applied, so a "day" always ends at 00:00 UTC.

use thiserror::Error;

use crate::record::Record;

pub const SECONDS_PER_HOUR: u64 = 60 * 60;

pub const SECONDS_PER_DAY: u64 = SECONDS_PER_HOUR * 24;

/// No record fell into the averaging interval.
///
/// Expected whenever a sensor did not report for a whole bucket. Callers
/// treat it as "not enough data yet".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no data recorded between {start} and {end}")]
pub struct CondensationError {
    pub start: u64,
    pub end: u64,
}

/// Average of all values with `start < timestamp < end`, rounded half away
/// from zero.
pub fn condensate(records: &[Record], start: u64, end: u64) -> Result<u16, CondensationError> {
    let (sum, count) = records
        .iter()
        .filter(|record| start < record.timestamp && record.timestamp < end)
        .fold((0u64, 0u64), |(sum, count), record| {
            (sum + u64::from(record.value), count + 1)
        });

    if count == 0 {
        return Err(CondensationError { start, end });
    }

    // Values are unsigned, so rounding half up is rounding away from zero.
    let average = (2 * sum + count) / (2 * count);
    Ok(u16::try_from(average).unwrap_or(u16::MAX))
}

/// Average of the hour ending at `end`.
pub fn condensate_hour(records: &[Record], end: u64) -> Result<u16, CondensationError> {
    condensate(records, end.saturating_sub(SECONDS_PER_HOUR), end)
}

/// Average of the 24 hours ending at `end`.
pub fn condensate_day(records: &[Record], end: u64) -> Result<u16, CondensationError> {
    condensate(records, end.saturating_sub(SECONDS_PER_DAY), end)
}

/// Start of the UTC hour containing `timestamp`.
pub const fn last_hour(timestamp: u64) -> u64 {
    timestamp - timestamp % SECONDS_PER_HOUR
}

/// Start of the UTC day containing `timestamp`.
pub const fn last_midnight(timestamp: u64) -> u64 {
    timestamp - timestamp % SECONDS_PER_DAY
}

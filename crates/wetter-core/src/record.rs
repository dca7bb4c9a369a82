//! The weather record stored in every buffer file.

use core::fmt::Display;

use serde::Serialize;

use crate::codec::{Element, Format};
use crate::error::{Error, Result};

/// Codec format of a weather record: `u64 LE` timestamp, `u16 LE` value.
pub const WEATHER_FORMAT: &str = "Pv";

/// Parsed form of [`WEATHER_FORMAT`].
pub fn weather_format() -> Format {
    Format::builtin(WEATHER_FORMAT)
}

/// One measurement or rollup.
///
/// Binary size: 10 bytes, packed
///
/// A record with a zero timestamp is the sentinel of a ring slot that was
/// never written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Record {
    /// Seconds since the unix epoch
    pub timestamp: u64,
    /// Normalized value, see the ingestion layer for its unit
    pub value: u16,
}

impl Record {
    pub const fn new(timestamp: u64, value: u16) -> Self {
        Self { timestamp, value }
    }

    /// True for a slot that was never written.
    pub const fn is_sentinel(&self) -> bool {
        self.timestamp == 0
    }

    /// The codec elements of this record, in [`WEATHER_FORMAT`] order.
    pub fn to_entry(self) -> [Element; 2] {
        [Element::from(self.timestamp), Element::from(self.value)]
    }
}

impl TryFrom<&[Element]> for Record {
    type Error = Error;

    fn try_from(entry: &[Element]) -> Result<Self> {
        let [timestamp, value] = entry else {
            return Err(Error::EntryArity {
                expected: 2,
                actual: entry.len(),
            });
        };

        let timestamp = u64::try_from(*timestamp).map_err(|_| Error::ValueOutOfRange {
            code: 'P',
            value: *timestamp,
        })?;
        let value = u16::try_from(*value).map_err(|_| Error::ValueOutOfRange {
            code: 'v',
            value: *value,
        })?;

        Ok(Self { timestamp, value })
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[Record] timestamp: {}, value: {}", self.timestamp, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_format_size() {
        assert_eq!(weather_format().element_size(), 10, "Record must be exactly 10 bytes");
        assert_eq!(weather_format().element_count(), 2);
    }

    #[test]
    fn test_record_from_entry() {
        let record = Record::try_from(&[1_700_000_000, 2931][..]).unwrap();
        assert_eq!(record, Record::new(1_700_000_000, 2931));
        assert_eq!(record.to_entry(), [1_700_000_000, 2931]);
    }

    #[test]
    fn test_record_from_entry_with_wrong_arity() {
        assert!(matches!(
            Record::try_from(&[1, 2, 3][..]),
            Err(Error::EntryArity {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_record_from_entry_out_of_range() {
        assert!(Record::try_from(&[-1, 0][..]).is_err());
        assert!(Record::try_from(&[0, 70_000][..]).is_err());
    }

    #[test]
    fn test_sentinel() {
        assert!(Record::default().is_sentinel());
        assert!(!Record::new(1, 0).is_sentinel());
    }
}

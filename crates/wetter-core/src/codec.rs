//! Fixed-width binary codec driven by compact format strings.
//!
//! A format is a string of single-character type codes. Every code has a
//! fixed byte width and byte order, independent of the host platform, and
//! records are packed back to back without alignment:
//!
//! | Code | Type | Width | Order |
//! |------|------|-------|-------|
//! | `c` / `C` | i8 / u8 | 1 | - |
//! | `s` / `S` | i16 / u16 | 2 | little |
//! | `v` / `n` | u16 | 2 | little / big |
//! | `l` / `L` | i32 / u32 | 4 | little |
//! | `V` / `N` | u32 | 4 | little / big |
//! | `q` / `Q` | i64 / u64 | 8 | little |
//! | `P` / `J` | u64 | 8 | little / big |
//! | `x` | pad byte | 1 | - |
//!
//! Pad bytes are zero-filled on pack and skipped on unpack, so they never
//! show up as elements.

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

use crate::error::{Error, Result};

/// A single unpacked value. Wide enough to hold every type code losslessly.
pub type Element = i128;

/// Raised when a format string contains codes the codec does not know.
///
/// Lists every offending code, not only the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported format code(s) {codes:?} in format {format:?}")]
pub struct InvalidFormat {
    pub format: String,
    pub codes: Vec<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypeCode {
    symbol: char,
    width: usize,
    signed: bool,
    big_endian: bool,
    padding: bool,
}

impl TypeCode {
    const fn int(symbol: char, width: usize, signed: bool, big_endian: bool) -> Self {
        Self {
            symbol,
            width,
            signed,
            big_endian,
            padding: false,
        }
    }

    const fn from_symbol(symbol: char) -> Option<Self> {
        let code = match symbol {
            'x' => Self {
                symbol,
                width: 1,
                signed: false,
                big_endian: false,
                padding: true,
            },
            'c' => Self::int(symbol, 1, true, false),
            'C' => Self::int(symbol, 1, false, false),
            's' => Self::int(symbol, 2, true, false),
            'S' | 'v' => Self::int(symbol, 2, false, false),
            'n' => Self::int(symbol, 2, false, true),
            'l' => Self::int(symbol, 4, true, false),
            'L' | 'V' => Self::int(symbol, 4, false, false),
            'N' => Self::int(symbol, 4, false, true),
            'q' => Self::int(symbol, 8, true, false),
            'Q' | 'P' => Self::int(symbol, 8, false, false),
            'J' => Self::int(symbol, 8, false, true),
            _ => return None,
        };
        Some(code)
    }

    fn bits(self) -> u32 {
        (self.width * 8) as u32
    }

    fn range(self) -> (Element, Element) {
        let bits = self.bits();
        let one: Element = 1;
        if self.signed {
            (-(one << (bits - 1)), (one << (bits - 1)) - 1)
        } else {
            (0, (one << bits) - 1)
        }
    }

    fn check(self, value: Element) -> Result<()> {
        let (min, max) = self.range();
        if value < min || value > max {
            return Err(Error::ValueOutOfRange {
                code: self.symbol,
                value,
            });
        }
        Ok(())
    }

    fn encode(self, value: Element, out: &mut Vec<u8>) {
        if self.padding {
            out.push(0);
            return;
        }

        // Two's complement truncation: the low bytes of the 128 bit pattern
        // are the encoding for every narrower width.
        let le = (value as u128).to_le_bytes();
        let bytes = &le[..self.width];
        if self.big_endian {
            out.extend(bytes.iter().rev());
        } else {
            out.extend_from_slice(bytes);
        }
    }

    fn decode(self, bytes: &[u8]) -> Element {
        let mut le = [0u8; 16];
        if self.big_endian {
            for (dst, src) in le.iter_mut().zip(bytes.iter().rev()) {
                *dst = *src;
            }
        } else {
            le[..self.width].copy_from_slice(bytes);
        }

        let raw = u128::from_le_bytes(le);
        if self.signed {
            let shift = 128 - self.bits();
            ((raw << shift) as i128) >> shift
        } else {
            raw as i128
        }
    }
}

/// A parsed format string describing one fixed-width record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    layout: String,
    codes: Vec<TypeCode>,
}

impl Format {
    /// Parse a format string, reporting all unknown codes at once.
    pub fn parse(layout: &str) -> Result<Self, InvalidFormat> {
        let mut codes = Vec::with_capacity(layout.len());
        let mut invalid = Vec::new();

        for symbol in layout.chars() {
            match TypeCode::from_symbol(symbol) {
                Some(code) => codes.push(code),
                None => invalid.push(symbol),
            }
        }

        if !invalid.is_empty() {
            return Err(InvalidFormat {
                format: layout.into(),
                codes: invalid,
            });
        }

        Ok(Self {
            layout: layout.into(),
            codes,
        })
    }

    /// Build one of the crate's own fixed formats.
    ///
    /// Only used with literals covered by tests; unknown codes are dropped.
    pub(crate) fn builtin(layout: &'static str) -> Self {
        Self {
            layout: layout.into(),
            codes: layout.chars().filter_map(TypeCode::from_symbol).collect(),
        }
    }

    /// The format string this format was parsed from.
    pub fn as_str(&self) -> &str {
        &self.layout
    }

    /// Packed size of one record in bytes, padding included.
    pub fn element_size(&self) -> usize {
        self.codes.iter().map(|code| code.width).sum()
    }

    /// Number of values in one record, padding excluded.
    pub fn element_count(&self) -> usize {
        self.codes.iter().filter(|code| !code.padding).count()
    }

    /// Verify arity and value ranges of `values` without packing them.
    pub fn check_entry(&self, values: &[Element]) -> Result<()> {
        let expected = self.element_count();
        if values.len() != expected {
            return Err(Error::EntryArity {
                expected,
                actual: values.len(),
            });
        }

        let elements = self.codes.iter().filter(|code| !code.padding);
        for (code, value) in elements.zip(values) {
            code.check(*value)?;
        }
        Ok(())
    }

    /// Pack one record, appending its bytes to `out`.
    pub fn pack_into(&self, values: &[Element], out: &mut Vec<u8>) -> Result<()> {
        self.check_entry(values)?;

        let mut values = values.iter();
        for code in &self.codes {
            let value = if code.padding {
                0
            } else {
                // check_entry guarantees one value per non-pad code
                values.next().copied().unwrap_or_default()
            };
            code.encode(value, out);
        }
        Ok(())
    }

    /// Pack one record into a fresh byte vector.
    pub fn pack(&self, values: &[Element]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.element_size());
        self.pack_into(values, &mut out)?;
        Ok(out)
    }

    /// Unpack exactly one record from `bytes`.
    pub fn unpack(&self, bytes: &[u8]) -> Result<Vec<Element>> {
        let expected = self.element_size();
        if bytes.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let mut values = Vec::with_capacity(self.element_count());
        let mut offset = 0;
        for code in &self.codes {
            if !code.padding {
                values.push(code.decode(&bytes[offset..offset + code.width]));
            }
            offset += code.width;
        }
        Ok(values)
    }
}

impl FromStr for Format {
    type Err = InvalidFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.layout)
    }
}

/// Validate a format string.
pub fn check_format(layout: &str) -> Result<(), InvalidFormat> {
    Format::parse(layout).map(|_| ())
}

/// Packed size in bytes of one record described by `layout`.
pub fn element_size(layout: &str) -> Result<usize, InvalidFormat> {
    Ok(Format::parse(layout)?.element_size())
}

/// Number of values in one record described by `layout`, padding excluded.
pub fn element_count(layout: &str) -> Result<usize, InvalidFormat> {
    Ok(Format::parse(layout)?.element_count())
}

pub fn pack(layout: &str, values: &[Element]) -> Result<Vec<u8>> {
    Format::parse(layout)?.pack(values)
}

pub fn unpack(layout: &str, bytes: &[u8]) -> Result<Vec<Element>> {
    Format::parse(layout)?.unpack(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_format_reports_every_invalid_code() {
        let err = check_format("AaBb").unwrap_err();
        assert_eq!(err.codes, vec!['A', 'a', 'B', 'b']);

        let err = check_format("PvZxy").unwrap_err();
        assert_eq!(err.codes, vec!['Z', 'y'], "valid codes must not be reported");
    }

    #[test]
    fn test_check_format_accepts_all_known_codes() {
        assert!(check_format("cCsSnvlLNVqQJPx").is_ok());
        assert!(check_format("").is_ok());
    }

    #[test]
    fn test_element_size_and_count() {
        assert_eq!(element_size("Pv").unwrap(), 10);
        assert_eq!(element_count("Pv").unwrap(), 2);
        assert_eq!(element_size("VVxx").unwrap(), 10);
        assert_eq!(element_count("VVxx").unwrap(), 2);
        assert_eq!(element_size("Vxxxxxx").unwrap(), 10);
        assert_eq!(element_count("Vxxxxxx").unwrap(), 1);
        assert_eq!(element_count("xxx").unwrap(), 0);
    }

    #[test]
    fn test_builtin_matches_parse() {
        for layout in ["Pv", "VVxx", "Vxxxxxx"] {
            assert_eq!(Format::builtin(layout), Format::parse(layout).unwrap());
        }
    }

    #[test]
    fn test_pack_weather_record_layout() {
        let bytes = pack("Pv", &[0x0102_0304_0506_0708, 0x0A0B]).unwrap();
        assert_eq!(
            bytes,
            vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, 0x0B, 0x0A]
        );
    }

    #[test]
    fn test_pack_big_endian_and_padding() {
        let bytes = pack("nxN", &[0x0102, 0x0A0B_0C0D]).unwrap();
        assert_eq!(bytes, vec![0x01, 0x02, 0x00, 0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(unpack("nxN", &bytes).unwrap(), vec![0x0102, 0x0A0B_0C0D]);
    }

    #[test]
    fn test_signed_values() {
        let bytes = pack("cslq", &[-1, -2, -3, i64::MIN as i128]).unwrap();
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(
            unpack("cslq", &bytes).unwrap(),
            vec![-1, -2, -3, i64::MIN as i128]
        );
    }

    #[test]
    fn test_pack_rejects_out_of_range_values() {
        assert!(matches!(
            pack("v", &[65_536]),
            Err(Error::ValueOutOfRange { code: 'v', value: 65_536 })
        ));
        assert!(matches!(
            pack("C", &[-1]),
            Err(Error::ValueOutOfRange { code: 'C', .. })
        ));
        assert!(pack("c", &[-128]).is_ok());
        assert!(pack("P", &[u64::MAX as i128]).is_ok());
    }

    #[test]
    fn test_pack_rejects_wrong_arity() {
        assert!(matches!(
            pack("Pv", &[1]),
            Err(Error::EntryArity {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_unpack_rejects_wrong_length() {
        assert!(matches!(
            unpack("Pv", &[0; 9]),
            Err(Error::SizeMismatch {
                expected: 10,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_unpack_multiple_elements_of_same_type() {
        let bytes = [1, 0, 2, 0, 3, 0];
        assert_eq!(unpack("vvv", &bytes).unwrap(), vec![1, 2, 3]);
    }

    fn format_and_values() -> impl Strategy<Value = (String, Vec<Element>)> {
        let code = prop_oneof![
            Just(('c', -128i128, 127i128)),
            Just(('C', 0, 255)),
            Just(('s', i16::MIN as i128, i16::MAX as i128)),
            Just(('n', 0, u16::MAX as i128)),
            Just(('v', 0, u16::MAX as i128)),
            Just(('l', i32::MIN as i128, i32::MAX as i128)),
            Just(('N', 0, u32::MAX as i128)),
            Just(('V', 0, u32::MAX as i128)),
            Just(('q', i64::MIN as i128, i64::MAX as i128)),
            Just(('J', 0, u64::MAX as i128)),
            Just(('P', 0, u64::MAX as i128)),
        ];
        prop::collection::vec((code, any::<bool>()), 1..8).prop_flat_map(|codes| {
            let mut layout = String::new();
            let mut ranges = Vec::new();
            for ((symbol, min, max), pad) in codes {
                layout.push(symbol);
                if pad {
                    layout.push('x');
                }
                ranges.push(min..=max);
            }
            (Just(layout), ranges)
        })
    }

    proptest! {
        #[test]
        fn test_pack_unpack_round_trip((layout, values) in format_and_values()) {
            let format = Format::parse(&layout).unwrap();
            let bytes = format.pack(&values).unwrap();
            prop_assert_eq!(bytes.len(), format.element_size());
            prop_assert_eq!(format.unpack(&bytes).unwrap(), values);
        }
    }
}

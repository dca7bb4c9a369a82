//! Append-only buffer of unbounded length.
//!
//! Binary format (little-endian):
//! - count: 4 bytes (u32)
//! - reserved: 6 bytes (zero)
//! - records: count × record size

use crate::codec::{Element, Format};
use crate::error::{Error, Result};

use super::{
    Buffer, check_position, read_entries, read_header, require_elements, validate_size,
};

const HEADER_FORMAT: &str = "Vxxxxxx";

/// Append-only record list, used for monthly and yearly rollups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceBuffer {
    format: Format,
    /// Entries back to back, `format.element_count()` elements each
    elements: Vec<Element>,
}

impl SequenceBuffer {
    /// Create an empty buffer.
    pub fn create_new(format: &Format) -> Result<Self> {
        require_elements(format)?;
        Ok(Self {
            format: format.clone(),
            elements: Vec::new(),
        })
    }

    fn stride(&self) -> usize {
        self.format.element_count()
    }
}

impl Buffer for SequenceBuffer {
    fn from_bytes(contents: &[u8], format: &Format) -> Result<Self> {
        require_elements(format)?;

        let header = read_header(contents, &Format::builtin(HEADER_FORMAT))?;
        let count = header
            .first()
            .and_then(|count| usize::try_from(*count).ok())
            .unwrap_or_default();
        validate_size(contents, format, count)?;

        Ok(Self {
            format: format.clone(),
            elements: read_entries(contents, format, count)?,
        })
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.len()).map_err(|_| Error::ValueOutOfRange {
            code: 'V',
            value: self.len() as Element,
        })?;

        let mut out = Vec::with_capacity(super::HEADER_SIZE + self.len() * self.format.element_size());
        Format::builtin(HEADER_FORMAT).pack_into(&[Element::from(count)], &mut out)?;
        for entry in self.entries() {
            self.format.pack_into(entry, &mut out)?;
        }
        Ok(out)
    }

    fn replace_entry(&mut self, position: usize, entry: &[Element]) -> Result<()> {
        self.format.check_entry(entry)?;
        check_position(position, self.len())?;

        let stride = self.stride();
        self.elements[position * stride..(position + 1) * stride].copy_from_slice(entry);
        Ok(())
    }

    fn add_entry(&mut self, entry: &[Element]) -> Result<()> {
        self.format.check_entry(entry)?;
        self.elements.extend_from_slice(entry);
        Ok(())
    }

    fn entries(&self) -> impl Iterator<Item = &[Element]> {
        self.elements.chunks_exact(self.stride())
    }

    fn len(&self) -> usize {
        self.elements.len() / self.stride()
    }

    fn format(&self) -> &Format {
        &self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, weather_format};

    fn sample_buffer() -> SequenceBuffer {
        let mut buffer = SequenceBuffer::create_new(&weather_format()).unwrap();
        buffer.add_entry(&[1_000, 10]).unwrap();
        buffer.add_entry(&[2_000, 20]).unwrap();
        buffer.add_entry(&[3_000, 30]).unwrap();
        buffer
    }

    #[test]
    fn test_create_new_is_empty() {
        let buffer = SequenceBuffer::create_new(&weather_format()).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.to_bytes().unwrap(), vec![0; 10], "only a zeroed header");
    }

    #[test]
    fn test_create_new_rejects_format_without_elements() {
        let format = Format::parse("xx").unwrap();
        assert!(matches!(
            SequenceBuffer::create_new(&format),
            Err(Error::EmptyFormat(_))
        ));
    }

    #[test]
    fn test_add_entry_rejects_wrong_arity() {
        let mut buffer = SequenceBuffer::create_new(&weather_format()).unwrap();
        assert!(matches!(
            buffer.add_entry(&[1, 2, 3]),
            Err(Error::EntryArity {
                expected: 2,
                actual: 3
            })
        ));
        assert!(buffer.is_empty(), "a rejected entry must not be stored");
    }

    #[test]
    fn test_entries_in_insertion_order() {
        let buffer = sample_buffer();
        assert_eq!(
            buffer.records().unwrap(),
            vec![
                Record::new(1_000, 10),
                Record::new(2_000, 20),
                Record::new(3_000, 30)
            ]
        );
        // iterating twice yields the same entries
        assert_eq!(buffer.entries().count(), 3);
        assert_eq!(buffer.entries().count(), 3);
    }

    #[test]
    fn test_replace_entry() {
        let mut buffer = sample_buffer();
        buffer.replace_entry(1, &[2_000, 25]).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.records().unwrap()[1], Record::new(2_000, 25));

        assert!(matches!(
            buffer.replace_entry(3, &[4_000, 40]),
            Err(Error::EntryOutOfBounds { position: 3, len: 3 })
        ));
    }

    #[test]
    fn test_binary_layout() {
        let mut buffer = SequenceBuffer::create_new(&weather_format()).unwrap();
        buffer.add_entry(&[0x0102, 0x0304]).unwrap();

        let bytes = buffer.to_bytes().unwrap();
        assert_eq!(
            bytes,
            vec![
                1, 0, 0, 0, 0, 0, 0, 0, 0, 0, // header
                0x02, 0x01, 0, 0, 0, 0, 0, 0, 0x04, 0x03, // record
            ]
        );
    }

    #[test]
    fn test_bytes_round_trip() {
        let bytes = sample_buffer().to_bytes().unwrap();
        let decoded = SequenceBuffer::from_bytes(&bytes, &weather_format()).unwrap();
        assert_eq!(decoded, sample_buffer());
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_from_bytes_rejects_size_mismatch() {
        let mut bytes = sample_buffer().to_bytes().unwrap();
        bytes.pop();
        assert!(matches!(
            SequenceBuffer::from_bytes(&bytes, &weather_format()),
            Err(Error::SizeMismatch {
                expected: 40,
                actual: 39
            })
        ));

        assert!(matches!(
            SequenceBuffer::from_bytes(&[1, 0, 0], &weather_format()),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = SequenceBuffer::from_file(&dir.path().join("2024.dat"), &weather_format())
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

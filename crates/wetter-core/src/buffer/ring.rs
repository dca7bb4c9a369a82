//! Fixed-capacity buffer that overwrites its oldest record.
//!
//! Binary format (little-endian):
//! - capacity: 4 bytes (u32)
//! - index: 4 bytes (u32), slot of the most recently written record
//! - reserved: 2 bytes (zero)
//! - records: capacity × record size, zeroed at creation
//!
//! A slot that was never written still holds zeros. Readers that care about
//! real data must skip those sentinel records.

use crate::codec::{Element, Format};
use crate::error::{Error, Result};

use super::{
    Buffer, HEADER_SIZE, check_position, read_entries, read_header, require_elements, validate_size,
};

const HEADER_FORMAT: &str = "VVxx";

/// Circular record log with a write cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer {
    format: Format,
    capacity: u32,
    /// Slot of the most recently written record
    index: u32,
    /// All slots back to back, `format.element_count()` elements each
    slots: Vec<Element>,
}

impl RingBuffer {
    /// Create a ring with `capacity` zeroed slots.
    pub fn create_new(capacity: u32, format: &Format) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::InvalidCapacity);
        }
        require_elements(format)?;

        Ok(Self {
            format: format.clone(),
            capacity,
            index: 0,
            slots: vec![0; capacity as usize * format.element_count()],
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slot of the most recently written record.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The record under the cursor, i.e. the most recently added one.
    pub fn last_entry(&self) -> &[Element] {
        self.slot(self.index)
    }

    fn stride(&self) -> usize {
        self.format.element_count()
    }

    fn slot(&self, index: u32) -> &[Element] {
        let start = index as usize * self.stride();
        &self.slots[start..start + self.stride()]
    }
}

impl Buffer for RingBuffer {
    fn from_bytes(contents: &[u8], format: &Format) -> Result<Self> {
        require_elements(format)?;

        let header = read_header(contents, &Format::builtin(HEADER_FORMAT))?;
        let [capacity, index] = header[..] else {
            return Err(Error::SizeMismatch {
                expected: HEADER_SIZE,
                actual: contents.len(),
            });
        };
        let (capacity, index) = (header_field(capacity)?, header_field(index)?);
        if capacity < 1 {
            return Err(Error::InvalidCapacity);
        }
        validate_size(contents, format, capacity as usize)?;
        if index >= capacity {
            return Err(Error::CorruptHeader { capacity, index });
        }

        Ok(Self {
            format: format.clone(),
            capacity,
            index,
            slots: read_entries(contents, format, capacity as usize)?,
        })
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.slots.len() * self.format.element_size());
        Format::builtin(HEADER_FORMAT).pack_into(
            &[Element::from(self.capacity), Element::from(self.index)],
            &mut out,
        )?;
        // Slots are stored in physical order, not chronological order.
        for entry in self.slots.chunks_exact(self.stride()) {
            self.format.pack_into(entry, &mut out)?;
        }
        Ok(out)
    }

    /// Advance the cursor, then overwrite the slot under it.
    fn add_entry(&mut self, entry: &[Element]) -> Result<()> {
        self.format.check_entry(entry)?;

        self.index = (self.index + 1) % self.capacity;
        let start = self.index as usize * self.stride();
        let stride = self.stride();
        self.slots[start..start + stride].copy_from_slice(entry);
        Ok(())
    }

    /// `position` counts from the oldest slot. The cursor does not move.
    fn replace_entry(&mut self, position: usize, entry: &[Element]) -> Result<()> {
        self.format.check_entry(entry)?;
        check_position(position, self.len())?;

        let slot = (self.index as usize + 1 + position) % self.capacity as usize;
        let stride = self.stride();
        self.slots[slot * stride..(slot + 1) * stride].copy_from_slice(entry);
        Ok(())
    }

    /// All slots from the oldest to the newest, sentinels included.
    fn entries(&self) -> impl Iterator<Item = &[Element]> {
        (1..=self.capacity).map(move |offset| {
            let index = ((u64::from(self.index) + u64::from(offset)) % u64::from(self.capacity)) as u32;
            self.slot(index)
        })
    }

    fn len(&self) -> usize {
        self.capacity as usize
    }

    fn format(&self) -> &Format {
        &self.format
    }
}

fn header_field(value: Element) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::ValueOutOfRange { code: 'V', value })
}

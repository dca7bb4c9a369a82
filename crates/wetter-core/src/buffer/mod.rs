//! On-disk buffers of fixed-width records.
//!
//! Two kinds share one file layout (a 10 byte header followed by packed
//! records) and one trait:
//!
//! - [`SequenceBuffer`]: unbounded, append-only. Used for the hourly rollups
//!   of a month and the daily rollups of a year.
//! - [`RingBuffer`]: fixed capacity, overwrites its oldest record. Used for
//!   the raw samples of the last 24 hours and the hourly rollups of the last
//!   31 days.
//!
//! Mutation of a buffer file always goes through [`Exclusive`], which holds
//! an OS-level advisory lock for the whole read-modify-write cycle.

pub mod exclusive;
pub mod ring;
pub mod sequence;

pub use exclusive::{Exclusive, operate_exclusive};
pub use ring::RingBuffer;
pub use sequence::SequenceBuffer;

use std::fs;
use std::path::Path;

use crate::codec::{Element, Format};
use crate::error::{Error, Result, io_error};
use crate::record::Record;

/// Header size shared by both buffer kinds
pub const HEADER_SIZE: usize = 10;

/// Behaviour shared by the ring and the sequence buffer.
pub trait Buffer: Sized {
    /// Decode a buffer from the full contents of its file.
    fn from_bytes(contents: &[u8], format: &Format) -> Result<Self>;

    /// Encode the buffer, header included. Exact inverse of [`Buffer::from_bytes`].
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Add one record. Fails if `entry` does not match the format.
    fn add_entry(&mut self, entry: &[Element]) -> Result<()>;

    /// Overwrite the entry at `position` of [`Buffer::entries`] in place.
    fn replace_entry(&mut self, position: usize, entry: &[Element]) -> Result<()>;

    /// All stored entries in chronological insertion order.
    fn entries(&self) -> impl Iterator<Item = &[Element]>;

    /// Number of entries yielded by [`Buffer::entries`].
    fn len(&self) -> usize;

    fn format(&self) -> &Format;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a buffer from an existing file.
    fn from_file(path: &Path, format: &Format) -> Result<Self> {
        let contents = fs::read(path).map_err(io_error(path))?;
        Self::from_bytes(&contents, format)
    }

    /// Entries decoded as weather records.
    fn records(&self) -> Result<Vec<Record>> {
        self.entries().map(Record::try_from).collect()
    }
}

/// Split the record area of a buffer file into entries.
///
/// `contents` must already have been checked against the declared count.
fn read_entries(contents: &[u8], format: &Format, count: usize) -> Result<Vec<Element>> {
    let size = format.element_size();
    let mut elements = Vec::with_capacity(count * format.element_count());
    for packed in contents[HEADER_SIZE..].chunks_exact(size).take(count) {
        elements.extend(format.unpack(packed)?);
    }
    Ok(elements)
}

/// Reject files whose length differs from `header + count * record size`.
fn validate_size(contents: &[u8], format: &Format, count: usize) -> Result<()> {
    let expected = HEADER_SIZE + count * format.element_size();
    if contents.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: contents.len(),
        });
    }
    Ok(())
}

/// Read the header fields of a buffer file.
fn read_header(contents: &[u8], header: &Format) -> Result<Vec<Element>> {
    if contents.len() < HEADER_SIZE {
        return Err(Error::SizeMismatch {
            expected: HEADER_SIZE,
            actual: contents.len(),
        });
    }
    header.unpack(&contents[..HEADER_SIZE])
}

fn check_position(position: usize, len: usize) -> Result<()> {
    if position >= len {
        return Err(Error::EntryOutOfBounds { position, len });
    }
    Ok(())
}

/// Format must carry at least one value.
fn require_elements(format: &Format) -> Result<()> {
    if format.element_count() < 1 {
        return Err(Error::EmptyFormat(format.as_str().into()));
    }
    Ok(())
}

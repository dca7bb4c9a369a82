//! Creation of the four buffer files of a series.
//!
//! A new buffer is written completely to a temporary file in the target
//! directory and then linked into place only if the target does not exist
//! yet. A concurrent first write of the same series therefore never observes
//! a half-written file, and the slower creator gets `AlreadyExists` instead
//! of clobbering the winner's data.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::info;
use tempfile::NamedTempFile;

use crate::buffer::{Buffer, RingBuffer, SequenceBuffer};
use crate::codec::Format;
use crate::config::{DEFAULT_24H_CAPACITY, DEFAULT_31D_CAPACITY};
use crate::error::{Error, Result, io_error};
use crate::locator::DataLocator;

/// Creates fresh buffer files at the paths of a [`DataLocator`].
#[derive(Debug, Clone)]
pub struct BufferCreator {
    locator: DataLocator,
    format: Format,
    ring_24h_capacity: u32,
    ring_31d_capacity: u32,
}

impl BufferCreator {
    pub fn new(locator: DataLocator, format: Format) -> Self {
        Self::with_capacities(locator, format, DEFAULT_24H_CAPACITY, DEFAULT_31D_CAPACITY)
    }

    pub fn with_capacities(
        locator: DataLocator,
        format: Format,
        ring_24h_capacity: u32,
        ring_31d_capacity: u32,
    ) -> Self {
        Self {
            locator,
            format,
            ring_24h_capacity,
            ring_31d_capacity,
        }
    }

    /// Create the ring for the raw samples of the last 24 hours.
    pub fn create_24h(&self, location: &str, quantity: &str) -> Result<()> {
        let ring = RingBuffer::create_new(self.ring_24h_capacity, &self.format)?;
        write_new(&self.locator.path_24h(location, quantity), &ring)
    }

    /// Create the ring for the hourly rollups of the last 31 days.
    pub fn create_31d(&self, location: &str, quantity: &str) -> Result<()> {
        let ring = RingBuffer::create_new(self.ring_31d_capacity, &self.format)?;
        write_new(&self.locator.path_31d(location, quantity), &ring)
    }

    /// Create the sequence for the hourly rollups of one month.
    pub fn create_month(&self, location: &str, quantity: &str, year: i32, month: u32) -> Result<()> {
        let buffer = SequenceBuffer::create_new(&self.format)?;
        write_new(&self.locator.month_path(location, quantity, year, month), &buffer)
    }

    /// Create the sequence for the daily rollups of one year.
    pub fn create_year(&self, location: &str, quantity: &str, year: i32) -> Result<()> {
        let buffer = SequenceBuffer::create_new(&self.format)?;
        write_new(&self.locator.year_path(location, quantity, year), &buffer)
    }
}

/// Write `buffer` to `path`, creating missing parent directories.
///
/// Fails with `AlreadyExists` if the file is already there.
fn write_new<B: Buffer>(path: &Path, buffer: &B) -> Result<()> {
    if path.exists() {
        return Err(already_exists(path));
    }

    let dir = path
        .parent()
        .ok_or_else(|| io_error(path)(io::ErrorKind::InvalidInput.into()))?;
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut file = NamedTempFile::with_prefix_in(".wetter-", dir).map_err(io_error(dir))?;
    file.write_all(&buffer.to_bytes()?).map_err(io_error(file.path()))?;
    file.as_file().sync_all().map_err(io_error(file.path()))?;
    file.persist_noclobber(path)
        .map_err(|e| io_error(path)(e.error))?;

    info!("Created buffer at {}", path.display());
    Ok(())
}

fn already_exists(path: &Path) -> Error {
    io_error(path)(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "can not create buffer, the file exists",
    ))
}

//! Repository tying the buffers of every series together.
//!
//! ## Write path
//!
//! [`WeatherRepository::persist`] handles one sample of a series:
//!
//! 1. Create any of the four buffers that does not exist yet.
//! 2. Lock the 24h ring. Everything below happens under this lock.
//! 3. Drop the sample if it arrives less than the minimum spacing after the
//!    newest raw sample.
//! 4. If the sample starts a new UTC day, append the average of the previous
//!    24 hours to the year sequence.
//! 5. If it starts a new UTC hour, append the average of the previous hour
//!    to the month sequence and to the 31d ring.
//! 6. Append the raw sample to the 24h ring and write it back.
//!
//! Locks are always taken in the order 24h, year, month, 31d.
//!
//! ## Cache
//!
//! Decoded buffers are kept in a [`BufferCache`] owned by the repository
//! instance. Every exclusive write replaces the cached copy with the buffer
//! it just wrote. Writes made by other processes become visible only after
//! [`BufferCache::clear`] or to a fresh repository.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike};
use log::{debug, trace, warn};

use crate::buffer::{Buffer, Exclusive, RingBuffer, SequenceBuffer, operate_exclusive};
use crate::codec::Format;
use crate::condense::{self, CondensationError};
use crate::config::{DEFAULT_MIN_SAMPLE_SPACING_SECS, StoreConfig};
use crate::creator::BufferCreator;
use crate::error::{Error, Result, io_error};
use crate::locator::{DataLocator, Granularity, check_name};
use crate::record::{Record, weather_format};

/// Timestamp → value series as returned by every query.
pub type Series = BTreeMap<u64, u16>;

/// Storage operations consumed by the ingestion and query layers.
pub trait WeatherStore {
    /// Store one sample of `quantity` measured at `location`.
    fn persist(&mut self, location: &str, quantity: &str, value: u16, timestamp: u64) -> Result<()>;

    /// Raw samples of the last 24 hours.
    fn query_24h(&mut self, location: &str, quantity: &str) -> Result<Series>;

    /// Hourly averages of the last 31 days.
    fn query_31d(&mut self, location: &str, quantity: &str) -> Result<Series>;

    /// Hourly averages recorded during one month.
    fn query_month(&mut self, location: &str, quantity: &str, year: i32, month: u32) -> Result<Series>;

    /// Daily averages recorded during one year.
    fn query_year(&mut self, location: &str, quantity: &str, year: i32) -> Result<Series>;

    /// All locations with a directory below the storage root.
    fn query_locations(&self) -> Result<Vec<String>>;

    /// Quantities of `location` that have a 24h buffer.
    fn query_quantities(&self, location: &str) -> Result<Vec<String>>;
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::buffer::RingBuffer {}
    impl Sealed for crate::buffer::SequenceBuffer {}
}

/// A buffer kind that can live in the [`BufferCache`].
///
/// Implemented for [`RingBuffer`] and [`SequenceBuffer`] only.
pub trait Cached: Buffer + sealed::Sealed {
    #[doc(hidden)]
    fn slots(cache: &mut BufferCache) -> &mut HashMap<PathBuf, Self>;
}

impl Cached for RingBuffer {
    fn slots(cache: &mut BufferCache) -> &mut HashMap<PathBuf, Self> {
        &mut cache.rings
    }
}

impl Cached for SequenceBuffer {
    fn slots(cache: &mut BufferCache) -> &mut HashMap<PathBuf, Self> {
        &mut cache.sequences
    }
}

/// Decoded buffers of one repository instance, keyed by path.
#[derive(Debug, Default)]
pub struct BufferCache {
    rings: HashMap<PathBuf, RingBuffer>,
    sequences: HashMap<PathBuf, SequenceBuffer>,
}

impl BufferCache {
    /// The cached buffer at `path`, loading it from disk on a miss.
    pub fn load<B: Cached>(&mut self, path: &Path, format: &Format) -> Result<&B> {
        match B::slots(self).entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let buffer = B::from_file(path, format)?;
                trace!("Cached buffer at {}", path.display());
                Ok(entry.insert(buffer))
            }
        }
    }

    /// Replace the cached copy of `path` with a freshly written buffer.
    pub fn store<B: Cached>(&mut self, path: PathBuf, buffer: B) {
        trace!("Refreshed cached buffer at {}", path.display());
        B::slots(self).insert(path, buffer);
    }

    /// Forget the cached copy of `path`, if any.
    pub fn invalidate(&mut self, path: &Path) {
        if self.rings.remove(path).is_some() || self.sequences.remove(path).is_some() {
            trace!("Invalidated cached buffer at {}", path.display());
        }
    }

    pub fn clear(&mut self) {
        self.rings.clear();
        self.sequences.clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.rings.contains_key(path) || self.sequences.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.rings.len() + self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Paths of the four buffers a sample touches.
#[derive(Debug)]
struct SeriesPaths {
    last_24h: PathBuf,
    last_31d: PathBuf,
    month: PathBuf,
    year: PathBuf,
}

/// File system backed [`WeatherStore`].
#[derive(Debug)]
pub struct WeatherRepository {
    locator: DataLocator,
    creator: BufferCreator,
    format: Format,
    min_sample_spacing: u64,
    cache: BufferCache,
}

impl WeatherRepository {
    /// Repository with default capacities and sample spacing.
    pub fn new(locator: DataLocator) -> Self {
        let format = weather_format();
        Self {
            creator: BufferCreator::new(locator.clone(), format.clone()),
            locator,
            format,
            min_sample_spacing: DEFAULT_MIN_SAMPLE_SPACING_SECS,
            cache: BufferCache::default(),
        }
    }

    /// Repository for the storage root and settings in `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let locator = DataLocator::new(&config.data_dir)?;
        let format = weather_format();
        Ok(Self {
            creator: BufferCreator::with_capacities(
                locator.clone(),
                format.clone(),
                config.ring_24h_capacity,
                config.ring_31d_capacity,
            ),
            locator,
            format,
            min_sample_spacing: config.min_sample_spacing_secs,
            cache: BufferCache::default(),
        })
    }

    pub fn locator(&self) -> &DataLocator {
        &self.locator
    }

    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut BufferCache {
        &mut self.cache
    }

    /// Create whichever of the four buffers of a series is missing.
    fn ensure_buffers(
        &self,
        location: &str,
        quantity: &str,
        year: i32,
        month: u32,
        paths: &SeriesPaths,
    ) -> Result<()> {
        tolerate_existing(&paths.last_24h, || self.creator.create_24h(location, quantity))?;
        tolerate_existing(&paths.last_31d, || self.creator.create_31d(location, quantity))?;
        tolerate_existing(&paths.month, || {
            self.creator.create_month(location, quantity, year, month)
        })?;
        tolerate_existing(&paths.year, || self.creator.create_year(location, quantity, year))
    }

    /// Append `record` to the buffer at `path` under its lock.
    fn append<B: Cached>(&mut self, path: &Path, record: Record) -> Result<()> {
        let ((), buffer) = operate_exclusive(path, &self.format, |buffer: &mut B| {
            buffer.add_entry(&record.to_entry())
        })?;
        self.cache.store(path.to_path_buf(), buffer);
        Ok(())
    }

    fn query<B: Cached>(&mut self, path: &Path) -> Result<Series> {
        let buffer = self.cache.load::<B>(path, &self.format)?;
        let mut series = Series::new();
        for record in buffer.records()? {
            if !record.is_sentinel() {
                series.insert(record.timestamp, record.value);
            }
        }
        Ok(series)
    }
}

impl WeatherStore for WeatherRepository {
    fn persist(&mut self, location: &str, quantity: &str, value: u16, timestamp: u64) -> Result<()> {
        check_name("location", location)?;
        check_name("quantity", quantity)?;

        let date = i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(Error::InvalidTimestamp(timestamp))?;
        let (year, month) = (date.year(), date.month());

        let paths = SeriesPaths {
            last_24h: self.locator.path_24h(location, quantity),
            last_31d: self.locator.path_31d(location, quantity),
            month: self.locator.month_path(location, quantity, year, month),
            year: self.locator.year_path(location, quantity, year),
        };
        self.ensure_buffers(location, quantity, year, month, &paths)?;

        let last_hour = condense::last_hour(timestamp);
        let last_midnight = condense::last_midnight(timestamp);

        let mut ring = Exclusive::<RingBuffer>::acquire(&paths.last_24h, &self.format)?;
        let last_entry_time = Record::try_from(ring.last_entry())?.timestamp;

        if timestamp.saturating_sub(last_entry_time) < self.min_sample_spacing {
            debug!(
                "Dropping {} of {} at {}: sample at {} is newer than {} - {} seconds",
                quantity,
                location,
                date.format("%H:%M %d.%m.%Y"),
                timestamp,
                last_entry_time,
                self.min_sample_spacing
            );
            ring.release();
            return Ok(());
        }

        // A fresh ring has nothing to condensate yet.
        let has_history = last_entry_time != 0;
        let snapshot = ring.records()?;

        if has_history && last_entry_time < last_midnight {
            debug!(
                "Condensating the day before {} for the {} at {} into {}",
                last_midnight,
                quantity,
                location,
                paths.year.display()
            );
            match condense::condensate_day(&snapshot, last_midnight) {
                Ok(average) => {
                    self.append::<SequenceBuffer>(&paths.year, Record::new(last_midnight, average))?
                }
                Err(e) => skip_rollup(location, quantity, e),
            }
        }

        if has_history && last_entry_time < last_hour {
            debug!(
                "Condensating the hour before {} for the {} at {} into {}",
                last_hour,
                quantity,
                location,
                paths.month.display()
            );
            match condense::condensate_hour(&snapshot, last_hour) {
                Ok(average) => {
                    let rollup = Record::new(last_hour, average);
                    self.append::<SequenceBuffer>(&paths.month, rollup)?;
                    self.append::<RingBuffer>(&paths.last_31d, rollup)?;
                }
                Err(e) => skip_rollup(location, quantity, e),
            }
        }

        ring.add_entry(&Record::new(timestamp, value).to_entry())?;
        let ring = ring.commit()?;
        self.cache.store(paths.last_24h, ring);
        Ok(())
    }

    fn query_24h(&mut self, location: &str, quantity: &str) -> Result<Series> {
        check_name("location", location)?;
        check_name("quantity", quantity)?;
        let path = self.locator.path(location, quantity, Granularity::Last24h);
        self.query::<RingBuffer>(&path)
    }

    fn query_31d(&mut self, location: &str, quantity: &str) -> Result<Series> {
        check_name("location", location)?;
        check_name("quantity", quantity)?;
        let path = self.locator.path(location, quantity, Granularity::Last31d);
        self.query::<RingBuffer>(&path)
    }

    fn query_month(&mut self, location: &str, quantity: &str, year: i32, month: u32) -> Result<Series> {
        check_name("location", location)?;
        check_name("quantity", quantity)?;
        let path = self.locator.path(location, quantity, Granularity::Month(year, month));
        self.query::<SequenceBuffer>(&path)
    }

    fn query_year(&mut self, location: &str, quantity: &str, year: i32) -> Result<Series> {
        check_name("location", location)?;
        check_name("quantity", quantity)?;
        let path = self.locator.path(location, quantity, Granularity::Year(year));
        self.query::<SequenceBuffer>(&path)
    }

    fn query_locations(&self) -> Result<Vec<String>> {
        sub_directories(self.locator.data_dir())
    }

    fn query_quantities(&self, location: &str) -> Result<Vec<String>> {
        check_name("location", location)?;
        let dir = self.locator.location_dir(location);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut quantities = sub_directories(&dir)?;
        quantities.retain(|quantity| self.locator.path_24h(location, quantity).is_file());
        Ok(quantities)
    }
}

/// Run `create` unless `path` exists. Losing a creation race is fine.
fn tolerate_existing(path: &Path, create: impl FnOnce() -> Result<()>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    match create() {
        Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!("Buffer at {} was created concurrently", path.display());
            Ok(())
        }
        result => result,
    }
}

fn skip_rollup(location: &str, quantity: &str, error: CondensationError) {
    warn!("Skipping rollup of {} at {}: {}", quantity, location, error);
}

/// Sorted names of the visible sub directories of `dir`.
fn sub_directories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        if !entry.file_type().map_err(io_error(&entry.path()))?.is_dir() {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) if !name.starts_with('.') => names.push(name),
            Ok(_) => {}
            Err(name) => warn!("Ignoring non UTF-8 directory {:?} in {}", name, dir.display()),
        }
    }
    names.sort();
    Ok(names)
}

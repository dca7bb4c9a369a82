//! Storage engine for the wetter weather observatory
//!
//! Every series (a quantity measured at a location) is kept in four binary
//! buffer files below one storage root:
//!
//! - a ring with the raw samples of the last 24 hours,
//! - a ring with hourly averages of the last 31 days,
//! - one sequence of hourly averages per calendar month,
//! - one sequence of daily averages per calendar year.
//!
//! [`WeatherRepository`] writes samples into the 24h ring and rolls them up
//! into the other buffers as hours and days complete. Several processes may
//! write to the same root concurrently; every read-modify-write of a buffer
//! file happens under an exclusive file lock.

pub mod buffer;
pub mod codec;
pub mod condense;
pub mod config;
pub mod creator;
pub mod error;
pub mod locator;
pub mod record;
pub mod repository;

pub use buffer::{Buffer, RingBuffer, SequenceBuffer};
pub use codec::{Element, Format};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use locator::{DataLocator, Granularity};
pub use record::Record;
pub use repository::{Series, WeatherRepository, WeatherStore};

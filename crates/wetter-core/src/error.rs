//! Error types shared by every storage component

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::InvalidFormat;
use crate::condense::CondensationError;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// The storage root or a configuration source is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A buffer file could not be opened, read, written or created.
    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The byte length of a buffer does not match what its header declares.
    #[error("buffer size does not add up: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The cursor stored in a ring header points outside the ring.
    #[error("corrupt ring header: index {index} is outside capacity {capacity}")]
    CorruptHeader { capacity: u32, index: u32 },

    #[error(transparent)]
    InvalidFormat(#[from] InvalidFormat),

    #[error(transparent)]
    Condensation(#[from] CondensationError),

    /// The OS-level advisory lock could not be taken.
    #[error("could not acquire lock on {}: {}", .path.display(), .source)]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("entry has {actual} elements, the format requires {expected}")]
    EntryArity { expected: usize, actual: usize },

    #[error("entry {position} is outside a buffer of {len} entries")]
    EntryOutOfBounds { position: usize, len: usize },

    #[error("ring buffer capacity must be at least 1")]
    InvalidCapacity,

    #[error("format {0:?} does not contain a single element")]
    EmptyFormat(String),

    #[error("value {value} does not fit format code '{code}'")]
    ValueOutOfRange { code: char, value: i128 },

    #[error("timestamp {0} cannot be represented as a UTC date")]
    InvalidTimestamp(u64),

    #[error("{kind} name {name:?} is not a single path component")]
    InvalidName { kind: &'static str, name: String },
}

impl Error {
    /// True when the error is an I/O failure caused by a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Attach `path` to an [`io::Error`], for use with `map_err`.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

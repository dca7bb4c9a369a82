//! Exclusive read-modify-write access to a buffer file.
//!
//! [`Exclusive::acquire`] opens the file, blocks until it holds an OS-level
//! advisory lock (`flock` on unix) and decodes the buffer. The caller mutates
//! the buffer through the guard and then either:
//!
//! - calls [`Exclusive::commit`], which truncates the file, rewrites it from
//!   offset 0, flushes and releases the lock, or
//! - drops the guard (early return, `?`, debounce, panic), which releases
//!   the lock and leaves the file untouched.
//!
//! The rewrite is not crash-atomic: a crash between the truncate and the
//! completed write leaves a truncated file that later fails the size check.
//! Writing a temporary file and renaming it over the original would not help
//! here, because waiters hold the lock on the old inode and would wake up
//! reading a file that is no longer linked.
//!
//! There is no timeout: a blocked writer waits until the holder lets go.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{trace, warn};

use crate::codec::Format;
use crate::error::{Error, Result, io_error};

use super::Buffer;

/// An open file holding an exclusive lock until dropped.
#[derive(Debug)]
struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_error(path))?;

        file.lock_exclusive().map_err(|source| Error::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        trace!("Locked {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        self.file
            .read_to_end(&mut contents)
            .map_err(io_error(&self.path))?;
        Ok(contents)
    }

    fn rewrite(&mut self, contents: &[u8]) -> Result<()> {
        let path = &self.path;
        self.file.set_len(0).map_err(io_error(path))?;
        self.file.seek(SeekFrom::Start(0)).map_err(io_error(path))?;
        self.file.write_all(contents).map_err(io_error(path))?;
        self.file.flush().map_err(io_error(path))?;
        self.file.sync_data().map_err(io_error(path))
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => trace!("Unlocked {}", self.path.display()),
            Err(e) => warn!("Failed to unlock {}: {}", self.path.display(), e),
        }
    }
}

/// Scoped exclusive access to one buffer file.
///
/// Derefs to the buffer. Nothing is written back unless [`Exclusive::commit`]
/// is called.
#[derive(Debug)]
pub struct Exclusive<B: Buffer> {
    file: LockedFile,
    buffer: B,
}

impl<B: Buffer> Exclusive<B> {
    /// Open and lock `path`, then decode its contents. Blocks while another
    /// process or handle holds the lock.
    pub fn acquire(path: &Path, format: &Format) -> Result<Self> {
        let mut file = LockedFile::open(path)?;
        let contents = file.read_all()?;
        let buffer = B::from_bytes(&contents, format)?;
        Ok(Self { file, buffer })
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Persist the buffer and release the lock. Returns the written buffer.
    pub fn commit(self) -> Result<B> {
        let Self { mut file, buffer } = self;
        let contents = buffer.to_bytes()?;
        file.rewrite(&contents)?;
        drop(file);
        Ok(buffer)
    }

    /// Release the lock without writing anything.
    pub fn release(self) -> B {
        self.buffer
    }
}

impl<B: Buffer> Deref for Exclusive<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.buffer
    }
}

impl<B: Buffer> DerefMut for Exclusive<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.buffer
    }
}

/// Run `operation` on the buffer at `path` while holding its lock.
///
/// On success the buffer is written back and returned together with the
/// operation's output. If the operation fails the lock is released and the
/// file keeps its previous contents.
pub fn operate_exclusive<B, T, F>(path: &Path, format: &Format, operation: F) -> Result<(T, B)>
where
    B: Buffer,
    F: FnOnce(&mut B) -> Result<T>,
{
    let mut guard = Exclusive::<B>::acquire(path, format)?;
    let output = operation(&mut guard)?;
    let buffer = guard.commit()?;
    Ok((output, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RingBuffer, SequenceBuffer};
    use crate::record::{Record, weather_format};
    use std::fs;

    fn write_sequence(path: &Path, records: &[Record]) {
        let mut buffer = SequenceBuffer::create_new(&weather_format()).unwrap();
        for record in records {
            buffer.add_entry(&record.to_entry()).unwrap();
        }
        fs::write(path, buffer.to_bytes().unwrap()).unwrap();
    }

    #[test]
    fn test_operate_exclusive_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.dat");
        write_sequence(&path, &[Record::new(1, 1)]);

        let (len, buffer) = operate_exclusive(&path, &weather_format(), |buffer: &mut SequenceBuffer| {
            buffer.add_entry(&[2, 2])?;
            Ok(buffer.len())
        })
        .unwrap();

        assert_eq!(len, 2);
        let on_disk = SequenceBuffer::from_file(&path, &weather_format()).unwrap();
        assert_eq!(on_disk, buffer);
        assert_eq!(
            on_disk.records().unwrap(),
            vec![Record::new(1, 1), Record::new(2, 2)]
        );
    }

    #[test]
    fn test_failed_operation_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.dat");
        write_sequence(&path, &[Record::new(1, 1)]);
        let before = fs::read(&path).unwrap();

        let result = operate_exclusive(&path, &weather_format(), |buffer: &mut SequenceBuffer| {
            buffer.add_entry(&[2, 2])?;
            Err::<(), _>(Error::InvalidCapacity)
        });

        assert!(matches!(result, Err(Error::InvalidCapacity)));
        assert_eq!(fs::read(&path).unwrap(), before, "file must not be rewritten");

        // The lock was released: a second exclusive operation goes through.
        operate_exclusive(&path, &weather_format(), |_: &mut SequenceBuffer| Ok(())).unwrap();
    }

    #[test]
    fn test_released_guard_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("24h.dat");
        let ring = RingBuffer::create_new(4, &weather_format()).unwrap();
        fs::write(&path, ring.to_bytes().unwrap()).unwrap();

        let mut guard = Exclusive::<RingBuffer>::acquire(&path, &weather_format()).unwrap();
        guard.add_entry(&[10, 1]).unwrap();
        let released = guard.release();

        assert_eq!(released.index(), 1);
        let on_disk = RingBuffer::from_file(&path, &weather_format()).unwrap();
        assert_eq!(on_disk, ring);
    }

    #[test]
    fn test_commit_shrinks_file_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("24h.dat");
        let ring = RingBuffer::create_new(2, &weather_format()).unwrap();
        fs::write(&path, ring.to_bytes().unwrap()).unwrap();

        let guard = Exclusive::<RingBuffer>::acquire(&path, &weather_format()).unwrap();
        guard.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), ring.to_bytes().unwrap());
    }

    #[test]
    fn test_acquire_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Exclusive::<RingBuffer>::acquire(&dir.path().join("24h.dat"), &weather_format())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_acquire_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("24h.dat");
        fs::write(&path, [3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap();

        let err = Exclusive::<RingBuffer>::acquire(&path, &weather_format()).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }
}

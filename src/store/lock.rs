use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

/// Exclusive advisory lock over a single file.
///
/// Wraps the platform file-lock primitive (`flock` family). The lock is
/// released on drop, and by the OS when the holding process dies, so jobs
/// owned by a crashed worker become reclaimable without cleanup.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Try to acquire without blocking. Returns `None` when another holder
    /// (in this process or any other) already has the lock.
    pub fn try_acquire(path: &Path) -> io::Result<Option<FileLock>> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLock { file })),
            Err(err)
                if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Acquire, blocking until the current holder releases. Only used for
    /// the root lock, which is held for the duration of one small
    /// read-modify-write cycle.
    pub fn acquire(path: &Path) -> io::Result<FileLock> {
        let file = Self::open(path)?;
        file.lock_exclusive()?;
        Ok(FileLock { file })
    }

    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).write(true).open(path)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Failure here leaves the lock to be released on close anyway.
        let _ = self.file.unlock();
    }
}

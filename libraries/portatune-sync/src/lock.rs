//! Advisory per-file source locks
//!
//! Cooperating processes (an importer filling the tree, a second sync run)
//! take the same lock, so a contended file means someone else is writing it
//! right now and the job is abandoned rather than raced.

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::Path;

/// An exclusive advisory lock on a source file, held for the lifetime of
/// the value.
#[derive(Debug)]
pub struct SourceLock {
    file: File,
}

impl SourceLock {
    /// Try to lock `path` without blocking.
    ///
    /// Returns `Ok(None)` when another process holds the lock, `Err` only
    /// for real IO failures (including the file being gone).
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        let file = File::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        // Dropping the File would release it anyway; unlock explicitly so
        // the release isn't deferred by a cloned descriptor.
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_within_process() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("track.flac");
        std::fs::write(&path, b"x").unwrap();

        let held = SourceLock::try_acquire(&path).unwrap();
        assert!(held.is_some());

        let contended = SourceLock::try_acquire(&path).unwrap();
        assert!(contended.is_none());

        drop(held);
        let reacquired = SourceLock::try_acquire(&path).unwrap();
        assert!(reacquired.is_some());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = SourceLock::try_acquire(&temp.path().join("gone.flac"));
        assert!(result.is_err());
    }
}

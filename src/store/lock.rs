//! Exclusive advisory locks (`flock`) on store files.
//!
//! Two archiver runs over the same maildir serialize on these: the log is
//! locked for the duration of one append, a month report from re-read to
//! rename. Readers never lock; the log only grows and reports are replaced
//! by rename.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Result, SmakError};

/// An exclusive lock on an open file, released on drop.
pub struct FileLock {
    path: PathBuf,
    #[cfg(unix)]
    file: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    file: File,
}

impl FileLock {
    /// Block until `file` is locked exclusively.
    pub fn exclusive(file: File, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        #[cfg(unix)]
        let file = {
            use nix::fcntl::{Flock, FlockArg};
            Flock::lock(file, FlockArg::LockExclusive)
                .map_err(|(_, errno)| SmakError::io(&path, std::io::Error::from(errno)))?
        };
        trace!(path = %path.display(), "Locked");
        Ok(Self { path, file })
    }

    /// Open (creating if needed) and lock the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| SmakError::io(path, e))?;
        Self::exclusive(file, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The locked file.
    pub fn file(&mut self) -> &mut File {
        &mut self.file
    }
}

impl fmt::Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock").field("path", &self.path).finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        trace!(path = %self.path.display(), "Unlocked");
    }
}

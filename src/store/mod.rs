//! Message store: the central append-only log and the advisory locks that
//! serialize writers of the store files.

pub mod lock;
pub mod log;

use std::path::Path;

use crate::error::{Result, SmakError};

/// Set the permission bits of `path`.
#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| SmakError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

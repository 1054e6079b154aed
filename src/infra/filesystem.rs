//! Filesystem operations
//!
//! Handles modification times, directory preparation and hard-linking of
//! artifacts into build contexts.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Modification time of `path`, or `None` if it does not exist.
///
/// Any other failure (permissions, I/O) is returned as an error.
pub fn modified_time(path: &Path) -> io::Result<Option<SystemTime>> {
    match std::fs::metadata(path) {
        Ok(metadata) => metadata.modified().map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a directory and all its contents, then create it empty
pub fn recreate_dir(path: &Path) -> io::Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)
}

/// Create the parent directory of `path` if it has one
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Hard-link `src` to `dst`, falling back to a copy when linking is not
/// possible (e.g., across filesystems). An existing `dst` is replaced.
pub fn link_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
    ensure_parent(dst)?;
    if dst.exists() {
        std::fs::remove_file(dst)?;
    }
    if std::fs::hard_link(src, dst).is_err() {
        std::fs::copy(src, dst)?;
    }
    Ok(())
}

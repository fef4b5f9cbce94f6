use std::io::ErrorKind;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{PackError, Result};

/// Delete a file or a whole directory tree, root included.
///
/// See [`delete_path_with`].
pub fn delete_path(path: &Path) -> Result<bool> {
    delete_path_with(path, true)
}

/// Delete the file or directory tree at `path`.
///
/// Directory contents go first, depth-first; the directory itself is removed
/// only when `remove_root` is set. Returns whether anything was deleted. A
/// missing path is not an error and yields `false`.
pub fn delete_path_with(path: &Path, remove_root: bool) -> Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PackError::io(path, e)),
    };

    if !metadata.is_dir() {
        if !remove_root {
            return Ok(false);
        }
        return remove(path, |p| std::fs::remove_file(p));
    }

    let mut deleted = false;
    for entry in WalkDir::new(path)
        .min_depth(1)
        .contents_first(true)
        .follow_links(false)
    {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(path).to_path_buf();
            PackError::io(at, e.into())
        })?;

        let removed = if entry.file_type().is_dir() {
            remove(entry.path(), |p| std::fs::remove_dir(p))?
        } else {
            remove(entry.path(), |p| std::fs::remove_file(p))?
        };
        deleted |= removed;
    }

    if remove_root {
        deleted |= remove(path, |p| std::fs::remove_dir(p))?;
    }

    tracing::debug!("Deleted {}", path.display());
    Ok(deleted)
}

/// Something else removing the entry first counts as already done.
fn remove(path: &Path, op: fn(&Path) -> std::io::Result<()>) -> Result<bool> {
    match op(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PackError::io(path, e)),
    }
}

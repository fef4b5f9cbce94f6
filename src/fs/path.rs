use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{PackError, Result};

/// Anchor a possibly-relative path at the application root.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Base name of a directory, resolving `.`-style paths through the filesystem.
pub fn folder_name(dir: &Path) -> Option<String> {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .or_else(|| {
            dir.canonicalize()
                .ok()?
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
}

/// Archive entry path for `file` found beneath `root`.
///
/// The root prefix is stripped and the remaining components are joined with
/// `/` whatever the host separator. With `keep_folder` the root's own name
/// leads every entry, so extraction reproduces one top-level folder.
pub fn entry_name(root: &Path, file: &Path, keep_folder: bool) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        PackError::io(
            file,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not under '{}'", root.display()),
            ),
        )
    })?;

    let mut parts: Vec<String> = Vec::new();
    if keep_folder && let Some(name) = folder_name(root) {
        parts.push(name);
    }
    parts.extend(
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            }),
    );

    Ok(parts.join("/"))
}

/// Directory-marker entry path: like [`entry_name`] with a trailing `/`.
pub fn directory_entry_name(root: &Path, dir: &Path, keep_folder: bool) -> Result<String> {
    let mut name = entry_name(root, dir, keep_folder)?;
    name.push('/');
    Ok(name)
}

/// Convert an entry path from an archive into a path relative to the
/// extraction root.
///
/// Both `/` and `\` separate segments. Empty and `.` segments are dropped;
/// `..`, a leading separator or a leading drive letter rejects the whole
/// entry. On Windows any `:` does too.
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf> {
    let unsafe_path = || PackError::UnsafeEntryPath(name.to_string());

    if name.starts_with('/') || name.starts_with('\\') {
        return Err(unsafe_path());
    }

    let mut path = PathBuf::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            _ => {}
        }
        let drive = path.as_os_str().is_empty() && has_drive_prefix(segment);
        if drive || (cfg!(windows) && segment.contains(':')) {
            return Err(unsafe_path());
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => return Err(unsafe_path()),
        }
    }

    Ok(path)
}

/// `C:` and friends, which mean an absolute location on Windows.
fn has_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

//! Creating archives from the filesystem and extracting them back.
//!
//! Both directions are synchronous and stream content through a
//! [`StreamCopier`]; only entry metadata is ever held in memory. Neither is
//! atomic: a failure part-way leaves the partial output on disk. Callers must
//! serialize operations that target the same path.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{IoResultExt, PackError, Result};
use crate::fs::{
    delete_path, directory_entry_name, entry_name, sanitize_entry_path, scan_tree,
};
use crate::io::{ARCHIVE_BUFFER_SIZE, LocalFileReader, ReadAt, StreamCopier};
use crate::zip::{CompressionMethod, ZipExtractor, ZipWriter};

/// Settings for [`create_archive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Prefix every entry with the source directory's own name.
    pub keep_folder: bool,
    pub compression: CompressionMethod,
    /// Emit directory markers for empty subdirectories.
    pub include_empty_dirs: bool,
    pub buffer_size: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            keep_folder: false,
            compression: CompressionMethod::Deflate,
            include_empty_dirs: false,
            buffer_size: ARCHIVE_BUFFER_SIZE,
        }
    }
}

impl ArchiveOptions {
    pub fn keep_folder(mut self, keep_folder: bool) -> Self {
        self.keep_folder = keep_folder;
        self
    }

    pub fn compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    pub fn include_empty_dirs(mut self, include: bool) -> Self {
        self.include_empty_dirs = include;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

/// Settings for [`extract_archive`] and [`extract_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub buffer_size: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            buffer_size: ARCHIVE_BUFFER_SIZE,
        }
    }
}

/// What an archive operation touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackStats {
    pub files: usize,
    pub directories: usize,
    /// Uncompressed content bytes.
    pub bytes: u64,
}

/// Build a fresh archive at `target` from a single file or a directory tree.
///
/// A single file becomes one entry named after its base name. A directory
/// contributes one entry per regular file beneath it, named by its path
/// relative to `source` (see [`ArchiveOptions::keep_folder`]). Whatever
/// already exists at `target` is deleted first, unless it is `source` or
/// contains it, which fails with [`PackError::Io`] and deletes nothing.
pub fn create_archive(source: &Path, target: &Path, options: &ArchiveOptions) -> Result<PackStats> {
    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PackError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        Err(e) => return Err(PackError::io(source, e)),
    };

    if covers_source(source, target)? {
        return Err(PackError::io(
            target,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("target would overwrite source {}", source.display()),
            ),
        ));
    }

    if fs::symlink_metadata(target).is_ok() {
        tracing::warn!("Replacing existing {}", target.display());
        delete_path(target)?;
    }

    // Scan before the target exists so an archive written inside its own
    // source tree never lists itself.
    let tree = if metadata.is_dir() {
        Some(scan_tree(source, options.include_empty_dirs)?)
    } else {
        None
    };

    let copier = StreamCopier::new(options.buffer_size);
    let file = File::create(target).at(target)?;
    let mut writer = ZipWriter::new(BufWriter::with_capacity(copier.buffer_size(), file));
    let mut stats = PackStats::default();

    match tree {
        None => {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PackError::SourceNotFound {
                    path: source.to_path_buf(),
                })?;
            stats.bytes += add_file(&mut writer, source, &name, options, copier)?;
            stats.files += 1;
        }
        Some(tree) => {
            add_files(&mut writer, source, &tree.files, options, copier, &mut stats)?;
            for dir in &tree.empty_dirs {
                let name = directory_entry_name(source, dir, options.keep_folder)?;
                let modified = fs::metadata(dir).and_then(|m| m.modified()).ok();
                writer.add_directory(&name, modified)?;
                tracing::debug!("  adding: {}", name);
                stats.directories += 1;
            }
        }
    }

    writer
        .finish()?
        .into_inner()
        .map_err(|e| PackError::io(target, e.into_error()))?;

    tracing::info!(
        "Created {} ({} files, {} directories, {} bytes)",
        target.display(),
        stats.files,
        stats.directories,
        stats.bytes
    );
    Ok(stats)
}

/// Whether `target` is `source` itself or one of its ancestors, so that
/// replacing it would destroy the content being archived.
fn covers_source(source: &Path, target: &Path) -> Result<bool> {
    let target = match fs::canonicalize(target) {
        Ok(target) => target,
        // An ancestor of an existing path exists too.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PackError::io(target, e)),
    };
    let source = fs::canonicalize(source).at(source)?;
    Ok(source.starts_with(&target))
}

/// Add every file of a scanned tree, stopping at the first failure.
fn add_files<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    source: &Path,
    files: &[PathBuf],
    options: &ArchiveOptions,
    copier: StreamCopier,
    stats: &mut PackStats,
) -> Result<()> {
    for path in files {
        let name = entry_name(source, path, options.keep_folder)?;
        stats.bytes += add_file(writer, path, &name, options, copier)?;
        stats.files += 1;
    }
    Ok(())
}

/// Stream one file into a new entry. The declared size is the file's length
/// when opened.
fn add_file<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    options: &ArchiveOptions,
    copier: StreamCopier,
) -> Result<u64> {
    let mut file = File::open(path).at(path)?;
    let metadata = file.metadata().at(path)?;
    let modified: Option<SystemTime> = metadata.modified().ok();

    writer.start_file(name, metadata.len(), options.compression, modified)?;
    copier.copy(&mut file, writer).at(path)?;
    let written = writer.finish_entry()?;

    tracing::debug!("  adding: {} ({} bytes)", name, written);
    Ok(written)
}

/// Extract every entry of the archive at `archive` beneath `destination`.
///
/// Directories are created on demand. Existing files are overwritten. Any
/// entry whose path would land outside `destination` aborts extraction with
/// [`PackError::UnsafeEntryPath`] before anything is written for it.
pub fn extract_archive(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<PackStats> {
    if !archive.exists() {
        return Err(PackError::ArchiveNotFound {
            path: archive.to_path_buf(),
        });
    }

    let reader = LocalFileReader::new(archive)?;
    let stats = extract_from(&ZipExtractor::new(reader), destination, options)?;

    tracing::info!(
        "Extracted {} into {} ({} files, {} directories, {} bytes)",
        archive.display(),
        destination.display(),
        stats.files,
        stats.directories,
        stats.bytes
    );
    Ok(stats)
}

/// Extract from an already opened archive source, local or remote.
pub fn extract_from<R: ReadAt>(
    extractor: &ZipExtractor<R>,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<PackStats> {
    let copier = StreamCopier::new(options.buffer_size);
    let mut stats = PackStats::default();

    for entry in extractor.list_files()? {
        let relative = sanitize_entry_path(&entry.file_name)?;
        let output_path = destination.join(&relative);

        if entry.is_directory {
            fs::create_dir_all(&output_path).at(&output_path)?;
            stats.directories += 1;
            tracing::debug!("   creating: {}", entry.file_name);
            continue;
        }

        if relative.as_os_str().is_empty() {
            return Err(PackError::UnsafeEntryPath(entry.file_name.clone()));
        }

        tracing::debug!("  extracting: {}", entry.file_name);
        stats.bytes += extractor.extract_to_file(&entry, &output_path, copier)?;
        stats.files += 1;
    }

    Ok(stats)
}

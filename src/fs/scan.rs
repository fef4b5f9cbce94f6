use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoResultExt, PackError, Result};

/// Everything found beneath a scanned root, in filesystem enumeration order.
#[derive(Debug, Default, Clone)]
pub struct SourceTree {
    /// Regular files at any depth.
    pub files: Vec<PathBuf>,
    /// Directories with no children at all. Only filled when requested.
    pub empty_dirs: Vec<PathBuf>,
}

/// Recursively enumerate the regular files beneath `root`.
///
/// Symbolic links are neither followed nor reported. When `root` is itself a
/// file the result holds just that file.
pub fn scan_tree(root: &Path, include_empty_dirs: bool) -> Result<SourceTree> {
    if !root.exists() {
        return Err(PackError::SourceNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut tree = SourceTree::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            PackError::io(path, e.into())
        })?;
        let file_type = entry.file_type();

        if file_type.is_file() {
            tree.files.push(entry.into_path());
        } else if file_type.is_dir() && include_empty_dirs && entry.depth() > 0 {
            let mut children = std::fs::read_dir(entry.path()).at(entry.path())?;
            if children.next().is_none() {
                tree.empty_dirs.push(entry.into_path());
            }
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
        paths.sort();
        paths
    }

    #[test]
    fn finds_files_at_every_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("a.txt"), b"abc").unwrap();
        fs::write(root.join("sub/b.txt"), b"bbbbb").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), b"c").unwrap();

        let tree = scan_tree(root, false).unwrap();
        assert_eq!(
            sorted(tree.files),
            vec![
                root.join("a.txt"),
                root.join("sub/b.txt"),
                root.join("sub/deeper/c.txt"),
            ]
        );
        assert!(tree.empty_dirs.is_empty());
    }

    #[test]
    fn reports_empty_directories_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::create_dir_all(root.join("outer/inner")).unwrap();
        fs::write(root.join("file.txt"), b"x").unwrap();

        let tree = scan_tree(root, true).unwrap();
        assert_eq!(tree.files, vec![root.join("file.txt")]);
        assert_eq!(
            sorted(tree.empty_dirs),
            vec![root.join("empty"), root.join("outer/inner")]
        );
    }

    #[test]
    fn single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("only.bin");
        fs::write(&file, b"1").unwrap();

        let tree = scan_tree(&file, true).unwrap();
        assert_eq!(tree.files, vec![file]);
    }

    #[test]
    fn missing_root_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_tree(&dir.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, PackError::SourceNotFound { .. }));
    }
}

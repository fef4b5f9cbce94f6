//! Filesystem helpers: tree scanning, entry-path construction and deletion.

mod delete;
mod path;
mod scan;

pub use delete::{delete_path, delete_path_with};
pub use path::{directory_entry_name, entry_name, folder_name, resolve_path, sanitize_entry_path};
pub use scan::{SourceTree, scan_tree};

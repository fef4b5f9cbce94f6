use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::fs::resolve_path;

#[derive(Parser, Debug)]
#[command(name = "runpack")]
#[command(version)]
#[command(about = "Create, extract and serve ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  runpack zip reports out.zip -k         archive reports/ keeping the folder name\n  \
  runpack unzip out.zip -d restored      extract into restored/\n  \
  runpack unzip -l https://example.com/archive.zip   list files from remote ZIP\n  \
  runpack download out.zip -o resp.http  write an attachment response")]
pub struct Cli {
    /// Directory relative paths are resolved against
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Quiet mode: warnings and errors only
    #[arg(short = 'q', global = true)]
    pub quiet: bool,

    /// Debug logging (one line per entry)
    #[arg(short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an archive from a file or directory
    Zip {
        /// File or directory to archive
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Archive to create (replaced if it exists)
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Keep the source directory name as top-level folder
        #[arg(short = 'k', long)]
        keep_folder: bool,

        /// Store entries without compression
        #[arg(long)]
        store: bool,

        /// Record empty directories
        #[arg(long)]
        empty_dirs: bool,
    },

    /// Extract or list an archive
    Unzip {
        /// ZIP file path or HTTP URL
        #[arg(value_name = "FILE")]
        file: String,

        /// Extract files into exdir
        #[arg(short = 'd', value_name = "DIR")]
        extract_dir: Option<PathBuf>,

        /// List files (short format)
        #[arg(short = 'l')]
        list: bool,

        /// List verbosely
        #[arg(long)]
        verbose_list: bool,

        /// Extract files to pipe
        #[arg(short = 'p')]
        pipe: bool,
    },

    /// Delete a file or directory tree
    Rm {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Empty the directory but keep it
        #[arg(long)]
        keep_root: bool,
    },

    /// Write a file as an HTTP attachment response
    Download {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Name offered to the client
        #[arg(short = 'n', long, value_name = "NAME")]
        name: Option<String>,

        /// Write the response here instead of stdout
        #[arg(short = 'o', value_name = "OUT")]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Anchor `path` at `--root`, or the current directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => resolve_path(root, path),
            None => path.to_path_buf(),
        }
    }

    /// Default `tracing` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "runpack=warn"
        } else if self.verbose {
            "runpack=debug"
        } else {
            "runpack=info"
        }
    }
}

pub fn is_http_url(file: &str) -> bool {
    file.starts_with("http://") || file.starts_with("https://")
}

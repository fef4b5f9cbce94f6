//! Main entry point for the runpack CLI application.
//!
//! This binary exposes archive creation, extraction (from local files or
//! HTTP URLs), recursive deletion and attachment downloads.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use runpack::cli::{Command, is_http_url};
use runpack::{
    ArchiveOptions, Cli, CompressionMethod, ExtractOptions, HttpRangeReader, HttpResponseSink,
    LocalFileReader, ReadAt, StreamCopier, TransferDescriptor, ZipExtractor, create_archive,
    delete_path_with, extract_from, stream_download,
};

/// Application entry point.
///
/// Installs logging on stderr, then dispatches to the selected command.
fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Command::Zip {
            source,
            archive,
            keep_folder,
            store,
            empty_dirs,
        } => {
            let source = cli.resolve(source);
            let archive = cli.resolve(archive);
            let options = ArchiveOptions::default()
                .keep_folder(*keep_folder)
                .include_empty_dirs(*empty_dirs)
                .compression(if *store {
                    CompressionMethod::Stored
                } else {
                    CompressionMethod::Deflate
                });

            let stats = create_archive(&source, &archive, &options)
                .with_context(|| format!("Creating {}", archive.display()))?;
            if !cli.quiet {
                eprintln!("{} files, {}", stats.files, format_size(stats.bytes));
            }
        }

        Command::Unzip {
            file,
            extract_dir,
            list,
            verbose_list,
            pipe,
        } => {
            let mode = UnzipMode {
                list: *list || *verbose_list,
                verbose: *verbose_list,
                pipe: *pipe,
                destination: extract_dir
                    .as_deref()
                    .map(|d| cli.resolve(d))
                    .unwrap_or_else(|| cli.resolve(Path::new("."))),
            };

            if is_http_url(file) {
                let reader = HttpRangeReader::new(file.clone())?;
                let extractor = ZipExtractor::new(reader);
                process_zip(&extractor, &mode)?;

                // Display network transfer statistics for HTTP sources
                if !cli.quiet {
                    let transferred = extractor.reader().transferred_bytes();
                    eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
                }
            } else {
                let path = cli.resolve(Path::new(file));
                let reader = LocalFileReader::new(&path)?;
                process_zip(&ZipExtractor::new(reader), &mode)
                    .with_context(|| format!("Reading {}", path.display()))?;
            }
        }

        Command::Rm { path, keep_root } => {
            let path = cli.resolve(path);
            let deleted = delete_path_with(&path, !*keep_root)
                .with_context(|| format!("Deleting {}", path.display()))?;
            if !cli.quiet {
                if deleted {
                    println!("deleted: {}", path.display());
                } else {
                    println!("nothing to delete: {}", path.display());
                }
            }
        }

        Command::Download { file, name, output } => {
            let path = cli.resolve(file);
            let descriptor = TransferDescriptor::from_path(&path, name.as_deref())?;

            match output {
                Some(out) => {
                    let out = cli.resolve(out);
                    let sink = std::fs::File::create(&out)
                        .with_context(|| format!("Creating {}", out.display()))?;
                    stream_download(descriptor, HttpResponseSink::new(sink))?;
                }
                None => {
                    let stdout = std::io::stdout();
                    stream_download(descriptor, HttpResponseSink::new(stdout.lock()))?;
                }
            }
        }
    }

    Ok(())
}

struct UnzipMode {
    list: bool,
    verbose: bool,
    pipe: bool,
    destination: PathBuf,
}

/// Process a ZIP archive: list it, pipe its files to stdout, or extract it.
fn process_zip<R: ReadAt>(extractor: &ZipExtractor<R>, mode: &UnzipMode) -> Result<()> {
    if mode.list {
        return list_files(extractor, mode.verbose);
    }

    if mode.pipe {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for entry in extractor.list_files()?.iter().filter(|e| !e.is_directory) {
            extractor.extract_to_writer(entry, &mut out, StreamCopier::archive())?;
        }
        out.flush()?;
        return Ok(());
    }

    extract_from(extractor, &mode.destination, &ExtractOptions::default())?;
    Ok(())
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just file names, one per line
/// - Verbose format (`--verbose-list`): Table with size, compression ratio and timestamps
fn list_files<R: ReadAt>(extractor: &ZipExtractor<R>, verbose: bool) -> Result<()> {
    let entries = extractor.list_files()?;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if !verbose {
            println!("{}", entry.file_name);
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }

    Ok(())
}

/// Percentage saved by compression, right-aligned in five columns.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

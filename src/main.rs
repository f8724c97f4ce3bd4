//! Batch-convert raster images to WebP.
//!
//! Thin command-line surface over the engine in [`command`]: argument
//! parsing, log setup, the final report, and exit-code mapping.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

mod codec;
mod command;
mod convert;
mod error;
mod stats;

use stats::ConversionResult;

/// Batch-convert raster images (JPEG, PNG, GIF, BMP, TIFF, WebP) to WebP.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Image files or directories to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write converted files into this directory instead of beside their sources
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// WebP quality, clamped to 1-100
    #[arg(short, long, default_value_t = 90)]
    quality: u32,

    /// Also convert images in subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Concurrent conversions (default: CPU count minus one, capped at 4)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log more details; repeat for debug output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match init_logging(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let request = command::Request {
        inputs: args.inputs,
        output_dir: args.output,
        quality: args.quality,
        recursive: args.recursive,
        jobs: args.jobs,
    };

    match command::run_conversion(&request) {
        Ok(result) => {
            print_report(&result);
            match result.failed.is_empty() {
                true => ExitCode::SUCCESS,
                false => ExitCode::from(1),
            }
        }
        Err(e) => {
            let e = anyhow::Error::new(e);
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Set up the tracing subscriber.
///
/// The returned guard flushes the file appender on drop and has to stay
/// alive for the whole process when logging to a file.
fn init_logging(args: &Args) -> anyhow::Result<Option<WorkerGuard>> {
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    match &args.log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// Print the end-of-run summary: totals always, failures enumerated.
fn print_report(result: &ConversionResult) {
    stdout("");
    stdout(format!(
        "Converted {} of {} file(s) in {}",
        result.processed,
        result.total_files,
        result.duration()
    ));
    stdout(format!("Skipped: {}", result.skipped));
    stdout(format!(
        "Read {}, saved {} ({})",
        result.input_size(),
        result.saved(),
        result.compression_ratio()
    ));
    if !result.failed.is_empty() {
        stdout(format!("Failed: {}", result.failed.len()));
        for failure in &result.failed {
            stdout(format!("  {}: {}", failure.file.display(), failure.error));
        }
    }
}

/// Print a line meant for the user, not the log.
fn stdout(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref());
}

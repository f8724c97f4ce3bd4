//! Access and disk-space validation for directory-to-directory runs.
//!
//! Only runs when a directory input meets an explicit output directory.
//! Single-file and same-directory conversions skip it entirely; their
//! failures surface per file instead.

use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::Disks;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A failed preflight check; always fatal for the run.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// The input directory could not be opened for reading.
    #[error("Cannot read input directory '{0}'")]
    InputNotReadable(PathBuf, #[source] std::io::Error),
    /// The output directory could not be created.
    #[error("Could not create output directory '{0}'")]
    CreateOutputDir(PathBuf, #[source] std::io::Error),
    /// The output directory exists but rejects writes.
    #[error("Output directory is not writable: '{0}'")]
    OutputNotWritable(PathBuf, #[source] std::io::Error),
    /// The input directory's size could not be measured.
    #[error("Error while measuring input directory '{0}'")]
    MeasureInput(PathBuf, #[source] walkdir::Error),
    /// The output filesystem does not have enough headroom for the batch.
    #[error(
        "Not enough disk space for converting '{input}': \
         about {required} bytes needed, {available} available"
    )]
    InsufficientDiskSpace {
        /// The input directory whose conversion would not fit.
        input: PathBuf,
        /// Input size plus the safety margin.
        required: u64,
        /// Free bytes on the output filesystem.
        available: u64,
    },
}

/// Validate access and disk headroom before a directory-to-directory batch.
///
/// The space check is advisory protection against failing mid-batch, not a
/// guarantee: files keep changing while the run is underway.
pub fn check(input_dir: &Path, output_dir: &Path) -> Result<(), PreflightError> {
    fs::read_dir(input_dir)
        .map_err(|e| PreflightError::InputNotReadable(input_dir.to_path_buf(), e))?;
    fs::create_dir_all(output_dir)
        .map_err(|e| PreflightError::CreateOutputDir(output_dir.to_path_buf(), e))?;
    // an unnamed scratch file is the cheapest honest writability probe
    tempfile::tempfile_in(output_dir)
        .map_err(|e| PreflightError::OutputNotWritable(output_dir.to_path_buf(), e))?;

    let input_size = directory_size(input_dir)?;
    // 20% headroom over the raw input size, for temp files and overhead
    let required = input_size + input_size / 5;

    match available_space(output_dir) {
        Some(available) if available < required => Err(PreflightError::InsufficientDiskSpace {
            input: input_dir.to_path_buf(),
            required,
            available,
        }),
        Some(available) => {
            debug!("preflight ok: {required} bytes needed, {available} available");
            Ok(())
        }
        None => {
            warn!("Could not determine free space for {output_dir:?}, continuing without the check");
            Ok(())
        }
    }
}

/// Sum of all regular file sizes below `root`.
fn directory_size(root: &Path) -> Result<u64, PreflightError> {
    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| PreflightError::MeasureInput(root.to_path_buf(), e))?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_or(0, |meta| meta.len());
        }
    }
    Ok(total)
}

/// Free bytes on the filesystem holding `path`.
///
/// Resolved by the longest mount point that prefixes the canonicalized
/// path; `None` when no mounted disk matches.
fn available_space(path: &Path) -> Option<u64> {
    let target = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(sysinfo::Disk::available_space)
}

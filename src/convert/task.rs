//! Per-file conversion: the skip decision and the atomic write protocol.
//!
//! The final output path is only ever touched by the closing rename. Every
//! earlier step works on a private temp file in the same directory, so an
//! observer either sees the finished output or nothing at all.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::Builder;
use thiserror::Error;
use tracing::debug;

use crate::codec::{Codec, CodecError, EncodeOptions};
use crate::convert::{ConversionConfig, ConversionTask};

/// Temp file name prefix; keeps in-flight files hidden and ignorable.
const TEMP_PREFIX: &str = ".towebp-";
/// Temp file name suffix.
const TEMP_SUFFIX: &str = ".tmp";

/// How a single task ended.
#[derive(Debug)]
pub enum Outcome {
    /// The output was produced and published.
    Converted {
        /// Size of the input file.
        input_bytes: u64,
        /// Size of the published output.
        output_bytes: u64,
    },
    /// The existing output is current; nothing was touched.
    Skipped,
    /// The conversion failed; the batch continues without it.
    Failed(ConvertError),
}

/// Failure of one file's conversion. Never aborts the batch.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input file's size could not be read.
    #[error("Could not read input '{0}'")]
    InputStat(PathBuf, #[source] std::io::Error),
    /// The output's directory could not be created.
    #[error("Could not create output directory '{0}'")]
    CreateDir(PathBuf, #[source] std::io::Error),
    /// No temp file could be created next to the output.
    #[error("Could not create a temporary file next to '{0}'")]
    TempFile(PathBuf, #[source] std::io::Error),
    /// The codec failed on this input.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The encoded bytes could not be written out.
    #[error("Could not write converted bytes for '{0}'")]
    WriteTemp(PathBuf, #[source] std::io::Error),
    /// The codec produced zero bytes.
    #[error("Codec produced an empty output for '{0}'")]
    EmptyOutput(PathBuf),
    /// The output path is a pre-existing symbolic link.
    #[error("Refusing to overwrite the symbolic link at '{0}'")]
    RefusedSymlinkOverwrite(PathBuf),
    /// The final rename into place failed.
    #[error("Could not publish the converted file to '{0}'")]
    Publish(PathBuf, #[source] std::io::Error),
}

/// Decide whether `input` still needs converting into `output`.
///
/// Missing, empty, or stale outputs must be converted. Stat errors fail
/// open: an I/O hiccup may cost a redundant conversion but can never
/// silently drop one.
pub fn should_convert(input: &Path, output: &Path) -> bool {
    let out_meta = match fs::metadata(output) {
        Ok(meta) => meta,
        Err(_) => return true,
    };
    if out_meta.len() == 0 {
        // leftover of an interrupted run before this tool wrote atomically
        return true;
    }
    match (
        fs::metadata(input).and_then(|meta| meta.modified()),
        out_meta.modified(),
    ) {
        (Ok(input_mtime), Ok(output_mtime)) => input_mtime > output_mtime,
        _ => true,
    }
}

/// Convert one task, publishing the output atomically.
pub fn convert_one<C: Codec>(
    task: &ConversionTask,
    codec: &C,
    config: &ConversionConfig,
) -> Outcome {
    if !should_convert(&task.input, &task.output) {
        debug!("output is current, skipping {:?}", task.input);
        return Outcome::Skipped;
    }
    match convert_inner(task, codec, config) {
        Ok(outcome) => outcome,
        Err(error) => Outcome::Failed(error),
    }
}

/// The fallible middle of [`convert_one`].
///
/// The temp file deletes itself when dropped, so every early return cleans
/// up without extra code, and a failing cleanup can never replace the
/// original error.
fn convert_inner<C: Codec>(
    task: &ConversionTask,
    codec: &C,
    config: &ConversionConfig,
) -> Result<Outcome, ConvertError> {
    let ConversionTask { input, output } = task;

    let input_bytes = fs::metadata(input)
        .map_err(|e| ConvertError::InputStat(input.clone(), e))?
        .len();

    // recursive mode writes into subdirectories that may not exist yet
    let out_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&out_dir).map_err(|e| ConvertError::CreateDir(out_dir.clone(), e))?;

    // the temp file must share the output's directory: the closing rename
    // is only atomic within one filesystem
    let mut temp = Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(&out_dir)
        .map_err(|e| ConvertError::TempFile(output.clone(), e))?;

    let probe = codec.probe(input)?;
    let options = EncodeOptions::webp(config.quality(), probe.color_space);
    let bytes = codec.encode(input, &options)?;
    if bytes.is_empty() {
        return Err(ConvertError::EmptyOutput(input.clone()));
    }

    temp.write_all(&bytes)
        .and_then(|()| temp.flush())
        .map_err(|e| ConvertError::WriteTemp(output.clone(), e))?;

    // a pre-existing symlink at the destination is never replaced
    if fs::symlink_metadata(output).is_ok_and(|meta| meta.file_type().is_symlink()) {
        return Err(ConvertError::RefusedSymlinkOverwrite(output.clone()));
    }

    let output_bytes = bytes.len() as u64;
    temp.persist(output)
        .map_err(|e| ConvertError::Publish(output.clone(), e.error))?;

    debug!("published {output:?} ({input_bytes} -> {output_bytes} bytes)");
    Ok(Outcome::Converted {
        input_bytes,
        output_bytes,
    })
}

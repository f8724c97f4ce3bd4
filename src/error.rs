//! Errors that abort a whole run.
//!
//! Failures local to a single file never show up here; they are captured in
//! the run statistics and reported at the end (see [`crate::convert::task`]).

use std::path::PathBuf;

use thiserror::Error;

use crate::convert::preflight::PreflightError;

/// A condition that makes the whole run fail with a non-zero exit.
#[derive(Debug, Error)]
pub enum RunError {
    /// The provided path is neither a regular file nor a directory.
    #[error("Not a regular file or directory: '{path}'")]
    InvalidInputKind {
        /// The offending input path.
        path: PathBuf,
        /// The stat error, when the path could not be resolved at all.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Discovery finished without a single eligible file.
    #[error("No images found in the given paths")]
    NoImagesFound,

    /// Access or disk-space validation failed before the batch started.
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    /// Listing a directory's contents failed.
    #[error("Encountered error while walking the directory '{0}'")]
    Walk(PathBuf, #[source] walkdir::Error),

    /// Could not listen to process signals.
    #[error("Could not listen to process signals")]
    Signals(#[source] std::io::Error),

    /// The user interrupted the run before all waves were scheduled.
    #[error("Got interrupted")]
    Interrupted,
}

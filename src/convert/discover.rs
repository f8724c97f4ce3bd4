//! Builds the conversion task list from user-provided paths.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::convert::{ConversionTask, classify, preflight};
use crate::error::RunError;
use crate::stats::SharedStats;

/// Walk all inputs and produce the conversion tasks for this run.
///
/// Advisory skips (non-image files, source/destination collisions) are
/// recorded in `stats` right here; they count toward the run's total but
/// never become tasks. A run that ends up with zero counted files fails
/// with [`RunError::NoImagesFound`].
pub fn discover_tasks(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    recursive: bool,
    stats: &SharedStats,
) -> Result<Vec<ConversionTask>, RunError> {
    let mut tasks = Vec::new();

    for input in inputs {
        // follows symlinks, so a linked file or directory resolves to its kind
        let meta = fs::metadata(input).map_err(|e| RunError::InvalidInputKind {
            path: input.clone(),
            source: Some(e),
        })?;

        if meta.is_file() {
            collect_file(input, output_dir, stats, &mut tasks);
        } else if meta.is_dir() {
            if let Some(out) = output_dir {
                preflight::check(input, out)?;
            }
            collect_dir(input, output_dir, recursive, stats, &mut tasks)?;
        } else {
            return Err(RunError::InvalidInputKind {
                path: input.clone(),
                source: None,
            });
        }
    }

    match stats.total_files() {
        0 => Err(RunError::NoImagesFound),
        _ => Ok(tasks),
    }
}

/// Queue an explicitly named file.
fn collect_file(
    input: &Path,
    output_dir: Option<&Path>,
    stats: &SharedStats,
    tasks: &mut Vec<ConversionTask>,
) {
    if !classify::is_image_file(input) {
        warn!("Not a supported image, skipping {input:?}");
        stats.count_advisory_skip();
        return;
    }
    let output = match output_dir {
        Some(dir) => dir.join(webp_name(input)),
        None => input.with_file_name(webp_name(input)),
    };
    push_task(input.to_path_buf(), output, stats, tasks);
}

/// Queue every eligible image found in a directory.
///
/// Non-recursive mode only looks at the immediate children. Every regular
/// file met on the way counts toward the run total; non-images count as
/// skipped. With an output directory, the entry's subdirectory structure is
/// mirrored below it.
fn collect_dir(
    root: &Path,
    output_dir: Option<&Path>,
    recursive: bool,
    stats: &SharedStats,
    tasks: &mut Vec<ConversionTask>,
) -> Result<(), RunError> {
    let max_depth = match recursive {
        true => usize::MAX,
        false => 1,
    };

    for entry in WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .max_depth(max_depth)
    {
        let entry = entry.map_err(|e| RunError::Walk(root.to_path_buf(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !classify::is_image_file(path) {
            debug!("not an image, skipping {path:?}");
            stats.count_advisory_skip();
            continue;
        }

        let output = match output_dir {
            Some(out) => {
                let rel = path
                    .strip_prefix(root)
                    .expect("walked entries stay under their root");
                let rel_dir = rel.parent().unwrap_or(Path::new(""));
                out.join(rel_dir).join(webp_name(path))
            }
            None => path.with_file_name(webp_name(path)),
        };
        push_task(path.to_path_buf(), output, stats, tasks);
    }
    Ok(())
}

/// Queue one task, unless source and destination are the same file.
fn push_task(
    input: PathBuf,
    output: PathBuf,
    stats: &SharedStats,
    tasks: &mut Vec<ConversionTask>,
) {
    if same_file(&input, &output) {
        warn!("Source and destination are the same file, skipping {input:?}");
        stats.count_advisory_skip();
        return;
    }
    debug!("queueing {input:?} -> {output:?}");
    stats.count_task();
    tasks.push(ConversionTask { input, output });
}

/// The output file name for an input: `<stem>.webp`.
fn webp_name(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    PathBuf::from(format!("{}.webp", stem.to_string_lossy()))
}

/// Compare two paths for identity without requiring both to exist.
///
/// The output usually does not exist yet, so both names are resolved
/// against their canonicalized parent directories instead.
fn same_file(input: &Path, output: &Path) -> bool {
    let resolve = |path: &Path| -> Option<PathBuf> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Some(parent.canonicalize().ok()?.join(path.file_name()?))
    };
    match (resolve(input), resolve(output)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write as _;

    use super::*;

    /// Write a small dummy file; discovery never reads image contents.
    fn touch(path: &Path) {
        let mut file = File::create(path).expect("create fixture file");
        file.write_all(b"fixture").expect("write fixture file");
    }

    #[test]
    fn mixed_directory_counts_every_regular_file() {
        let dir = tempfile::tempdir().expect("create sandbox");
        touch(&dir.path().join("a.png"));
        touch(&dir.path().join("b.png"));
        touch(&dir.path().join("notes.txt"));

        let stats = SharedStats::new();
        let tasks = discover_tasks(&[dir.path().to_path_buf()], None, false, &stats)
            .expect("discovery succeeds");

        assert_eq!(tasks.len(), 2, "two images become tasks");
        assert_eq!(stats.total_files(), 3, "the text file still counts");
    }

    #[test]
    fn non_recursive_listing_ignores_subdirectories() {
        let dir = tempfile::tempdir().expect("create sandbox");
        touch(&dir.path().join("top.png"));
        fs::create_dir(dir.path().join("nested")).expect("create subdir");
        touch(&dir.path().join("nested").join("deep.png"));

        let stats = SharedStats::new();
        let tasks = discover_tasks(&[dir.path().to_path_buf()], None, false, &stats)
            .expect("discovery succeeds");

        assert_eq!(tasks.len(), 1, "only the immediate child");
        assert_eq!(stats.total_files(), 1, "nested content is invisible");
    }

    #[test]
    fn recursive_output_mirrors_subdirectories() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let out = tempfile::tempdir().expect("create output sandbox");
        fs::create_dir(dir.path().join("nested")).expect("create subdir");
        touch(&dir.path().join("nested").join("deep.png"));

        let stats = SharedStats::new();
        let tasks = discover_tasks(
            &[dir.path().to_path_buf()],
            Some(out.path()),
            true,
            &stats,
        )
        .expect("discovery succeeds");

        assert_eq!(tasks.len(), 1, "the nested image is found");
        assert_eq!(
            tasks[0].output,
            out.path().join("nested").join("deep.webp"),
            "subdirectory structure is preserved"
        );
    }

    #[test]
    fn same_directory_output_lands_beside_the_source() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let input = dir.path().join("photo.png");
        touch(&input);

        let stats = SharedStats::new();
        let tasks =
            discover_tasks(&[input.clone()], None, false, &stats).expect("discovery succeeds");

        assert_eq!(tasks[0].output, dir.path().join("photo.webp"), "beside the source");
    }

    #[test]
    fn explicit_non_image_is_an_advisory_skip() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let input = dir.path().join("notes.txt");
        touch(&input);
        let image = dir.path().join("photo.png");
        touch(&image);

        let stats = SharedStats::new();
        let tasks = discover_tasks(&[input, image], None, false, &stats)
            .expect("non-image files never abort the run");

        assert_eq!(tasks.len(), 1, "only the image becomes a task");
        assert_eq!(stats.total_files(), 2, "the text file still counts");
    }

    #[test]
    fn webp_source_beside_itself_is_a_collision() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let input = dir.path().join("photo.webp");
        touch(&input);
        let other = dir.path().join("other.png");
        touch(&other);

        let stats = SharedStats::new();
        let tasks = discover_tasks(&[input, other], None, false, &stats)
            .expect("collisions never abort the run");

        assert_eq!(tasks.len(), 1, "the collision is filtered out");
        assert_eq!(stats.total_files(), 2, "the collision still counts as skipped");
    }

    #[test]
    fn empty_directory_fails_the_run() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let stats = SharedStats::new();
        let result = discover_tasks(&[dir.path().to_path_buf()], None, false, &stats);
        assert!(
            matches!(result, Err(RunError::NoImagesFound)),
            "zero counted files is a hard failure"
        );
    }

    #[test]
    fn missing_input_is_invalid() {
        let stats = SharedStats::new();
        let result = discover_tasks(
            &[PathBuf::from("/definitely/not/here.png")],
            None,
            false,
            &stats,
        );
        assert!(
            matches!(result, Err(RunError::InvalidInputKind { .. })),
            "nonexistent paths are rejected"
        );
    }
}

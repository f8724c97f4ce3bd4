//! Assembles and runs the conversion job requested by the user.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::codec::{Codec, WebpCodec};
use crate::convert::batch::{self, WaveProgress};
use crate::convert::{ConversionConfig, discover};
use crate::error::RunError;
use crate::stats::{ConversionResult, SharedStats, format_saved};

/// Everything the engine needs to know about one requested run.
#[derive(Debug, Clone)]
pub struct Request {
    /// Files and directories to convert.
    pub inputs: Vec<PathBuf>,
    /// Output directory; `None` writes beside the sources.
    pub output_dir: Option<PathBuf>,
    /// Requested WebP quality, clamped into `1..=100`.
    pub quality: u32,
    /// Whether directory inputs are walked recursively.
    pub recursive: bool,
    /// Explicit concurrency bound; `None` derives it from the CPU count.
    pub jobs: Option<usize>,
}

/// Convert every image reachable from the request, with the bundled codec.
///
/// Per-file failures never surface here; they are part of the returned
/// result. The error path is reserved for conditions that abort the run.
pub fn run_conversion(request: &Request) -> Result<ConversionResult, RunError> {
    run_with_codec(&WebpCodec, request)
}

/// Same as [`run_conversion`], for any codec implementation.
pub fn run_with_codec<C: Codec>(
    codec: &C,
    request: &Request,
) -> Result<ConversionResult, RunError> {
    let config = ConversionConfig::new(request.quality, request.jobs);
    info!(
        "starting run: quality {}, at most {} conversion(s) at once",
        config.quality(),
        config.max_concurrency()
    );

    let stats = SharedStats::new();
    let tasks = discover::discover_tasks(
        &request.inputs,
        request.output_dir.as_deref(),
        request.recursive,
        &stats,
    )?;
    debug!(
        "discovered {} task(s) among {} file(s)",
        tasks.len(),
        stats.total_files()
    );

    let cancel = interrupt_flag()?;
    let bar = progress_bar(tasks.len() as u64);
    let mut on_wave = |progress: WaveProgress| {
        bar.set_position(progress.completed);
        bar.set_message(format!("saved {}", format_saved(progress.saved_bytes)));
    };

    let batch_result = batch::run_batch(&tasks, codec, &config, &stats, &cancel, &mut on_wave);
    bar.finish_and_clear();
    batch_result?;

    Ok(stats.finalize())
}

/// SIGINT raises this flag; the scheduler checks it between waves.
fn interrupt_flag() -> Result<Arc<AtomicBool>, RunError> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))
        .map_err(RunError::Signals)?;
    Ok(flag)
}

/// One bar for the whole batch, advanced at wave boundaries.
fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("[{bar:30}] {pos}/{len} {msg}")
            .expect("static progress template is valid")
            .progress_chars("=> "),
    );
    bar
}

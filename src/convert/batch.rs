//! Wave-based scheduling of conversion tasks.
//!
//! Tasks run in consecutive waves of at most the configured concurrency.
//! Each wave is a hard barrier: the next one only starts once every task of
//! the current wave reached a terminal state. That bounds peak resource use
//! to one codec invocation per slot and makes progress reporting
//! deterministic, at the price of a fast task occasionally waiting for the
//! slowest of its wave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{error, info};

use crate::codec::Codec;
use crate::convert::task::{self, Outcome};
use crate::convert::{ConversionConfig, ConversionTask};
use crate::error::RunError;
use crate::stats::SharedStats;

/// Progress snapshot emitted after each completed wave.
#[derive(Debug, Clone, Copy)]
pub struct WaveProgress {
    /// Tasks that reached a terminal state so far.
    pub completed: u64,
    /// Tasks scheduled in total.
    pub scheduled: u64,
    /// Net bytes saved so far; negative when conversions grew files.
    pub saved_bytes: i64,
}

/// Run all tasks under the configured concurrency bound.
///
/// `on_wave` fires at every wave barrier. A raised `cancel` flag stops
/// before the next wave starts; tasks already in flight run to completion,
/// so no temp file or half-written output survives the abort.
pub fn run_batch<C: Codec>(
    tasks: &[ConversionTask],
    codec: &C,
    config: &ConversionConfig,
    stats: &SharedStats,
    cancel: &AtomicBool,
    on_wave: &mut dyn FnMut(WaveProgress),
) -> Result<(), RunError> {
    let scheduled = tasks.len() as u64;
    let mut completed = 0_u64;

    for wave in tasks.chunks(config.max_concurrency()) {
        if cancel.load(Ordering::SeqCst) {
            info!("interrupt received, not starting further waves");
            return Err(RunError::Interrupted);
        }

        thread::scope(|scope| {
            for task in wave {
                scope.spawn(move || {
                    let outcome = task::convert_one(task, codec, config);
                    apply_outcome(task, outcome, stats);
                });
            }
        });

        completed += wave.len() as u64;
        on_wave(WaveProgress {
            completed,
            scheduled,
            saved_bytes: stats.saved_bytes(),
        });
    }
    Ok(())
}

/// Fold one task's outcome into the shared counters.
fn apply_outcome(task: &ConversionTask, outcome: Outcome, stats: &SharedStats) {
    match outcome {
        Outcome::Converted {
            input_bytes,
            output_bytes,
        } => stats.record_processed(input_bytes, output_bytes),
        Outcome::Skipped => stats.record_skipped(),
        Outcome::Failed(err) => {
            error!("conversion failed for {:?}: {err}", task.input);
            stats.record_failed(task.input.clone(), error_chain(&err));
        }
    }
}

/// Render an error with its full source chain; the report stores plain text.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::codec::testing::{CountingCodec, FailingCodec, StaticCodec};

    /// Create `count` fixture inputs in `dir` and their conversion tasks.
    fn tasks_in(dir: &Path, count: usize) -> Vec<ConversionTask> {
        (0..count)
            .map(|i| {
                let input = dir.join(format!("img-{i}.png"));
                fs::write(&input, b"fixture").expect("write fixture input");
                let output = dir.join(format!("img-{i}.webp"));
                ConversionTask { input, output }
            })
            .collect()
    }

    fn run_quietly<C: Codec>(
        tasks: &[ConversionTask],
        codec: &C,
        config: &ConversionConfig,
        stats: &SharedStats,
    ) -> Result<(), RunError> {
        run_batch(
            tasks,
            codec,
            config,
            stats,
            &AtomicBool::new(false),
            &mut |_| {},
        )
    }

    #[test]
    fn concurrency_never_exceeds_the_bound() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let tasks = tasks_in(dir.path(), 20);
        let codec = CountingCodec::new(Duration::from_millis(15));
        let config = ConversionConfig::new(90, Some(4));
        let stats = SharedStats::new();

        run_quietly(&tasks, &codec, &config, &stats).expect("batch completes");

        assert!(
            codec.max_in_flight() <= 4,
            "saw {} codec invocations in flight",
            codec.max_in_flight()
        );
        let result = stats.finalize();
        assert_eq!(result.processed, 20, "every task converted");
    }

    #[test]
    fn progress_fires_at_wave_boundaries_only() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let tasks = tasks_in(dir.path(), 10);
        let codec = StaticCodec {
            bytes: vec![0xAB; 4],
        };
        let config = ConversionConfig::new(90, Some(4));
        let stats = SharedStats::new();

        let mut seen = Vec::new();
        run_batch(
            &tasks,
            &codec,
            &config,
            &stats,
            &AtomicBool::new(false),
            &mut |progress| seen.push(progress.completed),
        )
        .expect("batch completes");

        assert_eq!(seen, vec![4, 8, 10], "one observation per wave");
    }

    #[test]
    fn failures_are_recorded_and_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let tasks = tasks_in(dir.path(), 6);
        let config = ConversionConfig::new(90, Some(2));
        let stats = SharedStats::new();
        for _ in &tasks {
            stats.count_task();
        }

        run_quietly(&tasks, &FailingCodec, &config, &stats).expect("batch itself completes");

        let result = stats.finalize();
        assert_eq!(result.failed.len(), 6, "every failure recorded");
        assert_eq!(
            result.total_files,
            result.processed + result.skipped + result.failed.len() as u64,
            "accounting reconciles even when everything fails"
        );
        assert!(
            result.failed[0].error.contains("scripted failure"),
            "the cause survives into the report: {}",
            result.failed[0].error
        );
    }

    #[test]
    fn raised_cancel_flag_stops_before_the_first_wave() {
        let dir = tempfile::tempdir().expect("create sandbox");
        let tasks = tasks_in(dir.path(), 4);
        let codec = StaticCodec {
            bytes: vec![0xAB; 4],
        };
        let config = ConversionConfig::new(90, Some(2));
        let stats = SharedStats::new();

        let result = run_batch(
            &tasks,
            &codec,
            &config,
            &stats,
            &AtomicBool::new(true),
            &mut |_| {},
        );

        assert!(matches!(result, Err(RunError::Interrupted)), "got {result:?}");
        assert!(!tasks[0].output.exists(), "no task was launched");
    }
}

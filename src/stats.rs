//! Run accounting and the final conversion report.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A failed conversion, kept for the final report.
#[derive(Debug, Clone)]
pub struct FailedFile {
    /// The input file whose conversion failed.
    pub file: PathBuf,
    /// Human-readable failure cause, with its source chain.
    pub error: String,
}

/// Counters shared by every conversion running within one batch.
#[derive(Debug, Default)]
struct RunCounters {
    /// Files converted and published.
    processed: u64,
    /// Files skipped, either at discovery or by the skip policy.
    skipped: u64,
    /// Files whose conversion failed.
    failed: Vec<FailedFile>,
    /// All files the run looked at; `processed + skipped + failed` at the end.
    total_files: u64,
    /// Bytes read from converted inputs.
    total_input_bytes: u64,
    /// Net bytes saved; negative when conversions grew files.
    saved_bytes: i64,
}

/// Thread-safe owner of one run's counters.
///
/// Concurrent conversions all fold their outcomes in here; the mutex is the
/// only synchronization the batch needs.
pub struct SharedStats {
    /// The guarded counters.
    counters: Mutex<RunCounters>,
    /// When this run started.
    started: Instant,
}

impl SharedStats {
    /// Fresh counters; the run's clock starts now.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(RunCounters::default()),
            started: Instant::now(),
        }
    }

    /// Count a task queued by discovery.
    pub fn count_task(&self) {
        self.counters.lock().total_files += 1;
    }

    /// Count a file that discovery skipped without queueing a task.
    pub fn count_advisory_skip(&self) {
        let mut counters = self.counters.lock();
        counters.total_files += 1;
        counters.skipped += 1;
    }

    /// Fold in a successful conversion.
    pub fn record_processed(&self, input_bytes: u64, output_bytes: u64) {
        let mut counters = self.counters.lock();
        counters.processed += 1;
        counters.total_input_bytes += input_bytes;
        counters.saved_bytes += input_bytes as i64 - output_bytes as i64;
    }

    /// Fold in a task the skip policy decided against converting.
    pub fn record_skipped(&self) {
        self.counters.lock().skipped += 1;
    }

    /// Fold in a failed conversion.
    pub fn record_failed(&self, file: PathBuf, error: String) {
        self.counters.lock().failed.push(FailedFile { file, error });
    }

    /// Number of files counted so far.
    pub fn total_files(&self) -> u64 {
        self.counters.lock().total_files
    }

    /// Net bytes saved so far, for progress reporting.
    pub fn saved_bytes(&self) -> i64 {
        self.counters.lock().saved_bytes
    }

    /// Consume the counters into the immutable end-of-run report.
    pub fn finalize(self) -> ConversionResult {
        let elapsed = self.started.elapsed();
        let counters = self.counters.into_inner();
        ConversionResult {
            processed: counters.processed,
            skipped: counters.skipped,
            failed: counters.failed,
            total_files: counters.total_files,
            total_input_bytes: counters.total_input_bytes,
            saved_bytes: counters.saved_bytes,
            elapsed,
        }
    }
}

impl Default for SharedStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable summary of a finished run.
#[derive(Debug)]
pub struct ConversionResult {
    /// Files converted and published.
    pub processed: u64,
    /// Files skipped.
    pub skipped: u64,
    /// Files whose conversion failed, with their error messages.
    pub failed: Vec<FailedFile>,
    /// All files the run looked at.
    pub total_files: u64,
    /// Bytes read from converted inputs.
    pub total_input_bytes: u64,
    /// Net bytes saved; negative when conversions grew files.
    pub saved_bytes: i64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl ConversionResult {
    /// The run duration, as `3m 5s` or `42s`.
    pub fn duration(&self) -> String {
        format_duration(self.elapsed)
    }

    /// Total bytes read, in human units.
    pub fn input_size(&self) -> String {
        format_bytes(self.total_input_bytes)
    }

    /// Net bytes saved, in human units, with a sign when files grew.
    pub fn saved(&self) -> String {
        format_saved(self.saved_bytes)
    }

    /// Saved share of the input bytes; `0%` when nothing was read.
    pub fn compression_ratio(&self) -> String {
        if self.total_input_bytes == 0 {
            return "0%".into();
        }
        let ratio = self.saved_bytes as f64 / self.total_input_bytes as f64 * 100.0;
        format!("{ratio:.1}%")
    }
}

/// Render a duration as `<minutes>m <seconds>s`, minutes omitted when zero.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    match minutes {
        0 => format!("{seconds}s"),
        _ => format!("{minutes}m {seconds}s"),
    }
}

/// Render a byte count in human units: plain bytes undecorated, larger units
/// with two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{value:.2} {}", UNITS[unit]),
    }
}

/// Render a signed byte delta in human units.
pub fn format_saved(saved: i64) -> String {
    let magnitude = format_bytes(saved.unsigned_abs());
    match saved < 0 {
        true => format!("-{magnitude}"),
        false => magnitude,
    }
}

//! The conversion engine: task model, configuration, discovery, scheduling.

pub mod batch;
pub mod classify;
pub mod discover;
pub mod preflight;
pub mod task;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

/// One input to output conversion unit.
///
/// Created during discovery, consumed exactly once by the scheduler.
#[derive(Debug, Clone)]
pub struct ConversionTask {
    /// The image to convert.
    pub input: PathBuf,
    /// Where the converted WebP gets published.
    pub output: PathBuf,
}

/// Settings that stay fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct ConversionConfig {
    /// WebP quality, always within `1..=100`.
    quality: u8,
    /// Upper bound of conversions running at the same time.
    max_concurrency: usize,
}

impl ConversionConfig {
    /// Build a run configuration.
    ///
    /// `quality` is clamped into `1..=100` rather than rejected. Without an
    /// explicit `max_concurrency`, the bound leaves one core for the rest of
    /// the system and never exceeds four.
    pub fn new(quality: u32, max_concurrency: Option<usize>) -> Self {
        let quality = quality.clamp(1, 100) as u8;
        let max_concurrency = max_concurrency.map_or_else(Self::default_concurrency, |n| n.max(1));
        Self {
            quality,
            max_concurrency,
        }
    }

    /// The effective WebP quality.
    pub const fn quality(&self) -> u8 {
        self.quality
    }

    /// The effective concurrency bound.
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// `clamp(available cores - 1, 1, 4)`.
    fn default_concurrency() -> usize {
        let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        cores.saturating_sub(1).clamp(1, 4)
    }
}

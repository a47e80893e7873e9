use log::{LevelFilter, debug, error, info, warn};
use std::path::Path;
use std::time::{Duration, Instant};

use super::errors::{ConfigurationError, CrawlerResult};
use super::memory::MemorySample;

/// Map a configured level name to a filter. Accepts the usual aliases
/// (`warning`, `critical`) case-insensitively.
pub fn parse_log_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" | "critical" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// Initialize env_logger at the configured level; `RUST_LOG` directives still apply.
pub fn init_logging(level: &str) -> CrawlerResult<()> {
    let filter = parse_log_level(level)
        .ok_or_else(|| ConfigurationError::InvalidLogLevel(level.to_string()))?;

    // A logger installed earlier (tests, embedding binaries) is left in place.
    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .try_init();

    Ok(())
}

/// Running statistics for one crawl session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoggingStats {
    pub batches_started: usize,
    pub batches_completed: usize,
    pub pages_saved: usize,
    pub pages_failed: usize,
    pub errors_count: usize,
}

/// Structured progress logging for the batch dispatcher
pub struct CrawlerLogger {
    start_time: Instant,
    batch_started: Option<(usize, Instant)>,
    stats: LoggingStats,
}

impl CrawlerLogger {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            batch_started: None,
            stats: LoggingStats::default(),
        }
    }

    pub fn start_batch(&mut self, number: usize, total: usize, size: usize) {
        self.batch_started = Some((number, Instant::now()));
        self.stats.batches_started += 1;
        info!("Starting batch {}/{} ({} URLs)", number, total, size);
    }

    pub fn end_batch(&mut self, number: usize, succeeded: usize, failed: usize) {
        let elapsed = match self.batch_started.take() {
            Some((started, at)) if started == number => at.elapsed(),
            _ => Duration::ZERO,
        };
        self.stats.batches_completed += 1;
        info!(
            "Batch {} finished in {:?}: {} succeeded, {} failed",
            number, elapsed, succeeded, failed
        );
    }

    pub fn log_memory(&self, label: &str, sample: &MemorySample) {
        info!(
            "{} Current Memory: {} MB, Peak: {} MB",
            label,
            sample.current_mb(),
            sample.peak_mb()
        );
    }

    pub fn log_page_saved(&mut self, url: &str, path: &Path, bytes: usize) {
        self.stats.pages_saved += 1;
        info!("Successfully crawled and saved: {} -> {} ({} bytes)", url, path.display(), bytes);
    }

    /// The engine raised instead of reporting a structured result.
    pub fn log_page_error(&mut self, url: &str, error: &dyn std::fmt::Display) {
        self.stats.pages_failed += 1;
        self.stats.errors_count += 1;
        error!("Error crawling {}: {}", url, error);
    }

    /// Structured failure: only counted, the reason stays at debug level.
    pub fn log_page_failed(&mut self, url: &str, reason: &str) {
        self.stats.pages_failed += 1;
        warn!("Failed to crawl {}", url);
        debug!("   Reason: {}", reason);
    }

    pub fn log_write_failed(&mut self, url: &str, error: &dyn std::fmt::Display) {
        self.stats.pages_failed += 1;
        self.stats.errors_count += 1;
        error!("Crawled {} but could not save it: {}", url, error);
    }

    pub fn get_stats(&self) -> &LoggingStats {
        &self.stats
    }

    pub fn get_total_elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn log_final_summary(&self) {
        info!("Crawl session completed in {:?}", self.get_total_elapsed());
        info!(
            "   Batches: {}/{} completed",
            self.stats.batches_completed, self.stats.batches_started
        );
        info!("   Saved: {}", self.stats.pages_saved);
        info!("   Failed: {}", self.stats.pages_failed);
        info!("   Errors: {}", self.stats.errors_count);
    }
}

impl Default for CrawlerLogger {
    fn default() -> Self {
        Self::new()
    }
}

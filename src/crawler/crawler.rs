use log::{info, warn};
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::Path;

use super::dispatcher::{CrawlSummary, DispatchConfig, dispatch};
use super::engine::CrawlEngine;
use super::errors::CrawlerResult;
use super::file_manager::FileManager;
use super::logging::CrawlerLogger;
use super::memory::{MemoryMonitor, MemorySampler};
use super::sitemap::extract_urls_from_file;
use crate::config::config::Settings;

/// How a run ended when nothing aborted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The sitemap yielded no URLs; nothing was dispatched
    NoUrls,
    Completed(CrawlSummary),
}

/// Ask for a batch size; blank input, EOF, junk or zero fall back to `default`.
pub fn prompt_batch_size<R, W>(input: &mut R, output: &mut W, default: usize) -> CrawlerResult<usize>
where
    R: BufRead,
    W: Write,
{
    write!(output, "Enter batch size for parallel crawling (default {}): ", default)?;
    output.flush()?;

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            warn!("Ignoring unreadable batch size ({}), using {}", e, default);
            return Ok(default);
        }
        Err(e) => return Err(e.into()),
    }
    let answer = line.trim();

    if answer.is_empty() {
        return Ok(default);
    }
    match answer.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => {
            warn!("Ignoring batch size {:?}, using {}", answer, default);
            Ok(default)
        }
    }
}

/// Runs sitemap -> prompt -> dispatch against one engine instance.
pub struct Driver<'a, E: ?Sized, S> {
    settings: &'a Settings,
    engine: &'a E,
    monitor: MemoryMonitor<S>,
}

impl<'a, E, S> Driver<'a, E, S>
where
    E: CrawlEngine + ?Sized,
    S: MemorySampler,
{
    pub fn new(settings: &'a Settings, engine: &'a E, sampler: S) -> Self {
        Self {
            settings,
            engine,
            monitor: MemoryMonitor::new(sampler),
        }
    }

    /// Read the sitemap and, if it has URLs, prompt on `input` and crawl them.
    ///
    /// Once the engine has started it is always closed, and the final memory
    /// line printed, even when the run aborts with an error.
    pub async fn run<R, W>(
        &mut self,
        sitemap_path: &Path,
        input: &mut R,
        output: &mut W,
    ) -> CrawlerResult<RunOutcome>
    where
        R: BufRead,
        W: Write,
    {
        let urls = extract_urls_from_file(sitemap_path);
        if urls.is_empty() {
            writeln!(output, "No URLs found to crawl")?;
            return Ok(RunOutcome::NoUrls);
        }

        writeln!(output, "Found {} URLs to crawl", urls.len())?;
        let concurrency = prompt_batch_size(input, output, self.settings.batch_size)?;
        let config = DispatchConfig {
            concurrency,
            stagger: self.settings.request_stagger(),
            page_timeout: self.settings.page_timeout(),
            ready: self.settings.ready_condition()?,
        };

        writeln!(output, "\n=== Parallel Crawling with Browser Reuse + Memory Check ===")?;
        info!(
            "Dispatching {} URLs, concurrency {}, timeout {:?}, ready on {}",
            urls.len(),
            config.concurrency,
            config.page_timeout,
            config.ready
        );

        self.engine.start().await?;

        let mut logger = CrawlerLogger::new();
        let result = match FileManager::new(self.settings.output_path(), &self.settings.base_url) {
            Ok(writer) => Ok(dispatch(
                self.engine,
                &urls,
                &config,
                &writer,
                &mut self.monitor,
                &mut logger,
            )
            .await),
            Err(e) => Err(e),
        };

        // release the engine before anything else can fail
        let closing = writeln!(output, "\nClosing crawler...");
        self.engine.close().await;
        logger.log_memory("Final:", &self.monitor.checkpoint());

        if result.is_ok() {
            logger.log_final_summary();
        }
        let report = write_report(output, result.as_ref().ok(), self.monitor.peak_mb());

        let summary = result?;
        closing?;
        report?;
        Ok(RunOutcome::Completed(summary))
    }
}

/// Print the tally (when the run completed) and the peak memory line.
fn write_report<W: Write>(output: &mut W, summary: Option<&CrawlSummary>, peak_mb: u64) -> io::Result<()> {
    if let Some(summary) = summary {
        writeln!(output, "\nSummary:")?;
        writeln!(output, "  - Successfully crawled: {}", summary.successes)?;
        writeln!(output, "  - Failed: {}", summary.failures)?;
    }
    writeln!(output, "\nPeak memory usage (MB): {}", peak_mb)
}

use futures::future::join_all;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

use super::engine::{CrawlEngine, FetchOutcome, FetchRequest, ReadyCondition};
use super::errors::EngineError;
use super::file_manager::FileManager;
use super::logging::CrawlerLogger;
use super::memory::{MemoryMonitor, MemorySampler};

/// Knobs for one dispatch run
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum URLs in flight at once; 0 is treated as 1
    pub concurrency: usize,
    /// Delay between request submissions within a batch
    pub stagger: Duration,
    pub page_timeout: Duration,
    pub ready: ReadyCondition,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            stagger: Duration::from_millis(500),
            page_timeout: Duration::from_secs(60),
            ready: ReadyCondition::NetworkIdle,
        }
    }
}

/// Per-URL result of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Success { content: String },
    Failure { reason: String },
    /// The engine raised instead of reporting a result
    Exception { error: String },
}

impl From<Result<FetchOutcome, EngineError>> for CrawlOutcome {
    fn from(result: Result<FetchOutcome, EngineError>) -> Self {
        match result {
            Ok(FetchOutcome::Rendered { content }) => CrawlOutcome::Success { content },
            Ok(FetchOutcome::Failed { reason }) => CrawlOutcome::Failure { reason },
            Err(error) => CrawlOutcome::Exception {
                error: error.to_string(),
            },
        }
    }
}

/// Tally of a completed dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub successes: usize,
    pub failures: usize,
    pub batches: usize,
    /// Files written, in URL order
    pub saved: Vec<PathBuf>,
}

/// Sizes of the consecutive batches `len` URLs split into at `concurrency`.
pub fn batch_plan(len: usize, concurrency: usize) -> Vec<usize> {
    let size = concurrency.max(1);
    (0..len)
        .step_by(size)
        .map(|start| size.min(len - start))
        .collect()
}

/// Start offset of the `position`-th request in a batch; saturates instead of overflowing.
pub fn stagger_delay(stagger: Duration, position: usize) -> Duration {
    stagger.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX))
}

/// Fetch one batch. Request `j` is submitted `j * stagger` after the first;
/// the call returns once every request has resolved. Results line up with
/// `batch` positionally.
pub async fn process_batch<E>(
    engine: &E,
    batch: &[String],
    session_offset: usize,
    config: &DispatchConfig,
) -> Vec<CrawlOutcome>
where
    E: CrawlEngine + ?Sized,
{
    let fetches = batch.iter().enumerate().map(|(j, url)| {
        let request = FetchRequest::new(url, session_offset + j, config.page_timeout, config.ready);
        let delay = stagger_delay(config.stagger, j);
        async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            CrawlOutcome::from(engine.fetch(&request).await)
        }
    });

    join_all(fetches).await
}

/// Crawl `urls` in sequential batches, writing each successful page.
///
/// Batches never overlap. Per-URL errors, structured failures and per-file
/// write errors are counted as failures and never abort the run.
pub async fn dispatch<E, S>(
    engine: &E,
    urls: &[String],
    config: &DispatchConfig,
    writer: &FileManager,
    monitor: &mut MemoryMonitor<S>,
    logger: &mut CrawlerLogger,
) -> CrawlSummary
where
    E: CrawlEngine + ?Sized,
    S: MemorySampler,
{
    let size = config.concurrency.max(1);
    let total_batches = batch_plan(urls.len(), size).len();
    let mut summary = CrawlSummary::default();

    for (index, batch) in urls.chunks(size).enumerate() {
        let number = index + 1;
        let session_offset = index * size;

        logger.log_memory(&format!("Before batch {}:", number), &monitor.checkpoint());
        logger.start_batch(number, total_batches, batch.len());

        let outcomes = process_batch(engine, batch, session_offset, config).await;

        logger.log_memory(&format!("After batch {}:", number), &monitor.checkpoint());

        let (mut succeeded, mut failed) = (0, 0);
        for (url, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                CrawlOutcome::Success { content } => match writer.save(url, &content) {
                    Ok(path) => {
                        logger.log_page_saved(url, &path, content.len());
                        summary.saved.push(path);
                        succeeded += 1;
                    }
                    Err(e) => {
                        logger.log_write_failed(url, &e);
                        failed += 1;
                    }
                },
                CrawlOutcome::Failure { reason } => {
                    logger.log_page_failed(url, &reason);
                    failed += 1;
                }
                CrawlOutcome::Exception { error } => {
                    logger.log_page_error(url, &error);
                    failed += 1;
                }
            }
        }

        logger.end_batch(number, succeeded, failed);
        summary.successes += succeeded;
        summary.failures += failed;
        summary.batches += 1;
    }

    summary
}

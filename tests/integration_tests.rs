use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use sitemap_crawler::crawler::crawler::{Driver, RunOutcome};
use sitemap_crawler::crawler::dispatcher::{DispatchConfig, dispatch};
use sitemap_crawler::crawler::engine::{CrawlEngine, FetchOutcome, FetchRequest};
use sitemap_crawler::crawler::errors::{CrawlerError, CrawlerResult, EngineError};
use sitemap_crawler::crawler::file_manager::FileManager;
use sitemap_crawler::crawler::logging::CrawlerLogger;
use sitemap_crawler::crawler::memory::{MemoryMonitor, MemorySampler};
use sitemap_crawler::Settings;

const BASE: &str = "https://docs.agno.com/";

/// In-memory engine: renders `# <url>` unless told to fail or raise, and
/// records how many fetches overlap.
#[derive(Default)]
struct ScriptedEngine {
    fail: HashSet<String>,
    raise: HashSet<String>,
    content_suffix: String,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<(&'static str, String)>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl ScriptedEngine {
    fn events(&self) -> Vec<(&'static str, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrawlEngine for ScriptedEngine {
    async fn start(&self) -> CrawlerResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(("start", request.url.clone()));

        tokio::time::sleep(Duration::from_millis(5)).await;

        self.events.lock().unwrap().push(("end", request.url.clone()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.raise.contains(&request.url) {
            return Err(EngineError::RequestFailed {
                url: request.url.clone(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        if self.fail.contains(&request.url) {
            return Ok(FetchOutcome::Failed {
                reason: "HTTP status 500".to_string(),
            });
        }
        Ok(FetchOutcome::Rendered {
            content: format!("# {}{}", request.url, self.content_suffix),
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct FixedMemory(u64);

impl MemorySampler for FixedMemory {
    fn resident_bytes(&mut self) -> Option<u64> {
        self.0 += 1024 * 1024;
        Some(self.0)
    }
}

/// Console that breaks once the run starts shutting down.
#[derive(Default)]
struct BrokenPipeAtClose {
    written: Vec<u8>,
    broken: bool,
}

impl Write for BrokenPipeAtClose {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.broken || String::from_utf8_lossy(buf).contains("Closing") {
            self.broken = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn page_urls(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}guide/page-{}", BASE, i)).collect()
}

fn fast_config(concurrency: usize) -> DispatchConfig {
    DispatchConfig {
        concurrency,
        stagger: Duration::ZERO,
        ..DispatchConfig::default()
    }
}

fn write_sitemap(dir: &Path, urls: &[String]) -> std::path::PathBuf {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for url in urls {
        xml.push_str(&format!("  <url><loc>{}</loc></url>\n", url));
    }
    xml.push_str("</urlset>\n");
    let path = dir.join("sitemap.xml");
    fs::write(&path, xml).unwrap();
    path
}

fn test_settings(output_dir: &Path) -> Settings {
    Settings {
        output_dir: output_dir.to_string_lossy().into_owned(),
        request_stagger_ms: 0,
        ..Settings::default()
    }
}

#[tokio::test]
async fn test_in_flight_never_exceeds_concurrency() {
    let temp_dir = TempDir::new().unwrap();
    let writer = FileManager::new(temp_dir.path(), BASE).unwrap();
    let engine = ScriptedEngine::default();
    let urls = page_urls(10);
    let mut monitor = MemoryMonitor::new(FixedMemory(0));
    let mut logger = CrawlerLogger::new();

    let summary = dispatch(&engine, &urls, &fast_config(4), &writer, &mut monitor, &mut logger).await;

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.successes, 10);
    assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_batches_do_not_overlap() {
    let temp_dir = TempDir::new().unwrap();
    let writer = FileManager::new(temp_dir.path(), BASE).unwrap();
    let engine = ScriptedEngine::default();
    let urls = page_urls(7);
    let mut monitor = MemoryMonitor::new(FixedMemory(0));
    let mut logger = CrawlerLogger::new();

    dispatch(&engine, &urls, &fast_config(3), &writer, &mut monitor, &mut logger).await;

    let events = engine.events();
    assert_eq!(events.len(), 14);
    for (batch_index, batch) in urls.chunks(3).enumerate() {
        let last_end = events
            .iter()
            .rposition(|(kind, url)| *kind == "end" && batch.contains(url))
            .unwrap();
        for later in urls.chunks(3).skip(batch_index + 1) {
            let first_start = events
                .iter()
                .position(|(kind, url)| *kind == "start" && later.contains(url))
                .unwrap();
            assert!(last_end < first_start, "batch {} overlaps a later batch", batch_index + 1);
        }
    }

    // two checkpoints per batch
    assert_eq!(monitor.peak_bytes(), 6 * 1024 * 1024);
}

#[tokio::test]
async fn test_raised_fetch_does_not_stop_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let writer = FileManager::new(temp_dir.path(), BASE).unwrap();
    let urls = page_urls(3);
    let engine = ScriptedEngine {
        raise: HashSet::from([urls[1].clone()]),
        ..ScriptedEngine::default()
    };
    let mut monitor = MemoryMonitor::new(FixedMemory(0));
    let mut logger = CrawlerLogger::new();

    let summary = dispatch(&engine, &urls, &fast_config(3), &writer, &mut monitor, &mut logger).await;

    assert_eq!(summary.successes, 2);
    assert_eq!(summary.failures, 1);
    assert!(temp_dir.path().join("guide").join("page-1.md").exists());
    assert!(!temp_dir.path().join("guide").join("page-2.md").exists());
    assert!(temp_dir.path().join("guide").join("page-3.md").exists());
    assert_eq!(logger.get_stats().errors_count, 1);
}

#[tokio::test]
async fn test_rerun_overwrites_previous_content() {
    let temp_dir = TempDir::new().unwrap();
    let writer = FileManager::new(temp_dir.path(), BASE).unwrap();
    let urls = vec![format!("{}a/b", BASE)];
    let mut monitor = MemoryMonitor::new(FixedMemory(0));
    let mut logger = CrawlerLogger::new();

    let first = ScriptedEngine::default();
    dispatch(&first, &urls, &fast_config(1), &writer, &mut monitor, &mut logger).await;

    let second = ScriptedEngine {
        content_suffix: " (updated)".to_string(),
        ..ScriptedEngine::default()
    };
    let summary = dispatch(&second, &urls, &fast_config(1), &writer, &mut monitor, &mut logger).await;

    let path = temp_dir.path().join("a").join("b.md");
    assert_eq!(summary.saved, vec![path.clone()]);
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "# https://docs.agno.com/a/b (updated)"
    );
}

#[tokio::test]
async fn test_end_to_end_seven_urls_one_failure() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("docs_agno");
    let urls = page_urls(7);
    let sitemap = write_sitemap(temp_dir.path(), &urls);
    let settings = test_settings(&output_dir);
    let engine = ScriptedEngine {
        fail: HashSet::from([urls[4].clone()]),
        ..ScriptedEngine::default()
    };

    let mut driver = Driver::new(&settings, &engine, FixedMemory(0));
    let mut input = Cursor::new(b"3\n".to_vec());
    let mut output = Vec::new();
    let outcome = driver.run(&sitemap, &mut input, &mut output).await.unwrap();

    let summary = match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::NoUrls => panic!("expected a completed run"),
    };
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.successes, 6);
    assert_eq!(summary.failures, 1);
    assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 3);
    assert!(engine.started.load(Ordering::SeqCst));
    assert!(engine.closed.load(Ordering::SeqCst));

    let written = fs::read_dir(output_dir.join("guide")).unwrap().count();
    assert_eq!(written, 6);
    assert!(!output_dir.join("guide").join("page-5.md").exists());

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("Found 7 URLs to crawl"));
    assert!(printed.contains("  - Successfully crawled: 6"));
    assert!(printed.contains("  - Failed: 1"));
    assert!(printed.contains("Peak memory usage (MB): 7"));
}

#[tokio::test]
async fn test_default_batch_size_from_settings() {
    let temp_dir = TempDir::new().unwrap();
    let urls = page_urls(5);
    let sitemap = write_sitemap(temp_dir.path(), &urls);
    let settings = Settings {
        batch_size: 2,
        ..test_settings(&temp_dir.path().join("out"))
    };
    let engine = ScriptedEngine::default();

    let mut driver = Driver::new(&settings, &engine, FixedMemory(0));
    let mut input = Cursor::new(b"\n".to_vec());
    let mut output = Vec::new();
    let outcome = driver.run(&sitemap, &mut input, &mut output).await.unwrap();

    match outcome {
        RunOutcome::Completed(summary) => assert_eq!(summary.batches, 3),
        RunOutcome::NoUrls => panic!("expected a completed run"),
    }
    assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_urls_skips_engine() {
    let temp_dir = TempDir::new().unwrap();
    let sitemap = temp_dir.path().join("sitemap.xml");
    fs::write(&sitemap, "<urlset><url><loc>unterminated").unwrap();
    let settings = test_settings(&temp_dir.path().join("out"));
    let engine = ScriptedEngine::default();

    let mut driver = Driver::new(&settings, &engine, FixedMemory(0));
    let mut input = Cursor::new(Vec::new());
    let mut output = Vec::new();
    let outcome = driver.run(&sitemap, &mut input, &mut output).await.unwrap();

    assert_eq!(outcome, RunOutcome::NoUrls);
    assert!(!engine.started.load(Ordering::SeqCst));
    assert_eq!(String::from_utf8(output).unwrap(), "No URLs found to crawl\n");
    assert!(!temp_dir.path().join("out").exists());
}

#[tokio::test]
async fn test_engine_closed_when_output_root_fails() {
    let temp_dir = TempDir::new().unwrap();
    let urls = page_urls(2);
    let sitemap = write_sitemap(temp_dir.path(), &urls);

    // a regular file where the output directory should go
    let blocked = temp_dir.path().join("blocked");
    fs::write(&blocked, "not a directory").unwrap();
    let settings = test_settings(&blocked.join("out"));
    let engine = ScriptedEngine::default();

    let mut driver = Driver::new(&settings, &engine, FixedMemory(0));
    let mut input = Cursor::new(b"2\n".to_vec());
    let mut output = Vec::new();
    let result = driver.run(&sitemap, &mut input, &mut output).await;

    assert!(matches!(result, Err(CrawlerError::FileOperation(_))));
    assert!(engine.closed.load(Ordering::SeqCst));
    assert!(engine.events().is_empty());

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("Closing crawler..."));
    assert!(printed.contains("Peak memory usage (MB):"));
    assert!(!printed.contains("Summary:"));
}

#[tokio::test]
async fn test_engine_closed_when_console_breaks() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("out");
    let urls = page_urls(3);
    let sitemap = write_sitemap(temp_dir.path(), &urls);
    let settings = test_settings(&output_dir);
    let engine = ScriptedEngine::default();

    let mut driver = Driver::new(&settings, &engine, FixedMemory(0));
    let mut input = Cursor::new(b"3\n".to_vec());
    let mut output = BrokenPipeAtClose::default();
    let result = driver.run(&sitemap, &mut input, &mut output).await;

    match result {
        Err(CrawlerError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected a console error, got {:?}", other),
    }
    assert!(engine.started.load(Ordering::SeqCst));
    assert!(engine.closed.load(Ordering::SeqCst));
    // pages crawled before the console broke are still on disk
    assert_eq!(fs::read_dir(output_dir.join("guide")).unwrap().count(), 3);
    assert!(String::from_utf8(output.written).unwrap().contains("Found 3 URLs to crawl"));
}

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use spider::chromiumoxide::browser::{Browser, BrowserConfig};
use spider::configuration::WaitForIdleNetwork;
use spider::page::Page;
use spider::website::Website;
use spider_transformations::transformation::content::{
    ReturnFormat, TransformConfig, transform_content,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::engine::{CrawlEngine, FetchOutcome, FetchRequest, ReadyCondition};
use super::errors::{CrawlerResult, EngineError};

/// Upper bound on how long a page may keep the network busy before extraction.
const NETWORK_IDLE_WAIT: Duration = Duration::from_secs(10);

/// Browser options fixed for the whole run
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub user_agent: Option<String>,
    /// Remote browser to attach to instead of launching a local Chrome
    pub chrome_connection_url: Option<String>,
}

/// The browser held between `start` and `close`.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    /// DevTools endpoint every request's `Website` attaches to
    endpoint: String,
    /// Launched by us, so `close` shuts the process down
    owned: bool,
}

/// Headless Chrome rendering through spider, with markdown extraction.
///
/// `start` launches (or attaches to) one browser that serves the whole run.
/// Each request drives it through its own `Website`, which opens a separate
/// browser context, so concurrent sessions never share cookies, storage or
/// navigation state.
pub struct SpiderEngine {
    options: EngineOptions,
    session: Mutex<Option<BrowserSession>>,
}

impl SpiderEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            session: Mutex::new(None),
        }
    }

    pub async fn is_started(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn endpoint(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.endpoint.clone())
    }

    async fn acquire_browser(&self) -> CrawlerResult<BrowserSession> {
        let (browser, handler, owned) = match self.options.chrome_connection_url.as_deref() {
            Some(remote) => {
                let remote = remote.trim();
                if remote.is_empty() {
                    return Err(EngineError::StartFailed("empty chrome connection url".to_string()).into());
                }
                info!("[spider_engine] attaching to remote browser at {}", remote);
                let (browser, handler) = Browser::connect(remote)
                    .await
                    .map_err(|e| EngineError::StartFailed(format!("{}: {}", remote, e)))?;
                (browser, handler, false)
            }
            None => {
                let config = BrowserConfig::builder()
                    .args(vec![
                        "--no-sandbox",
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        "--disable-extensions",
                    ])
                    .build()
                    .map_err(EngineError::StartFailed)?;
                let (browser, handler) = Browser::launch(config)
                    .await
                    .map_err(|e| EngineError::StartFailed(format!("failed to launch Chrome: {}", e)))?;
                info!("[spider_engine] launched headless Chrome at {}", browser.websocket_address());
                (browser, handler, true)
            }
        };

        let mut handler = handler;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserSession {
            endpoint: browser.websocket_address().clone(),
            browser,
            handler,
            owned,
        })
    }

    fn website_for(&self, request: &FetchRequest, endpoint: &str) -> Website {
        let mut website = Website::new(&request.url);

        // only the page itself
        website.with_depth(0);
        website.with_limit(1);
        website.with_user_agent(self.options.user_agent.as_deref());
        website.configuration.with_request_timeout(Some(request.timeout));

        // headless Chrome renders JavaScript before the HTML is captured
        website.with_chrome_intercept(Default::default());
        website.with_chrome_connection(Some(endpoint.to_string()));

        if request.ready == ReadyCondition::NetworkIdle {
            let idle = NETWORK_IDLE_WAIT.min(request.timeout);
            website.with_wait_for_idle_network(Some(WaitForIdleNetwork::new(Some(idle))));
        }

        website
    }
}

#[async_trait]
impl CrawlEngine for SpiderEngine {
    async fn start(&self) -> CrawlerResult<()> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.acquire_browser().await?);
        }
        Ok(())
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, EngineError> {
        let endpoint = self.endpoint().await.ok_or(EngineError::NotStarted)?;
        debug!(
            "[spider_engine] {} start -> {} (ready: {})",
            request.session_id, request.url, request.ready
        );

        let mut website = self.website_for(request, &endpoint);

        if tokio::time::timeout(request.timeout, website.scrape()).await.is_err() {
            return Err(EngineError::Timeout {
                url: request.url.clone(),
                after: request.timeout,
            });
        }

        match website.get_pages().and_then(|pages| pages.first()) {
            Some(page) => Ok(outcome_for_page(page)),
            None => Err(EngineError::RequestFailed {
                url: request.url.clone(),
                reason: "browser returned no page".to_string(),
            }),
        }
    }

    async fn close(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        if session.owned {
            if let Err(e) = session.browser.close().await {
                warn!("[spider_engine] closing browser failed: {}", e);
            }
            let _ = session.browser.wait().await;
        }
        session.handler.abort();
        info!("[spider_engine] browser released");
    }
}

/// Why a rendered response can't be saved, if it can't.
fn rejection_reason(status: u16, html: &str) -> Option<String> {
    if !(200..300).contains(&status) {
        return Some(format!("HTTP status {}", status));
    }
    if html.trim().is_empty() {
        return Some("empty document".to_string());
    }
    None
}

fn outcome_for_page(page: &Page) -> FetchOutcome {
    if let Some(reason) = rejection_reason(page.status_code.as_u16(), &page.get_html()) {
        warn!("[spider_engine] {} for {}", reason, page.get_url());
        return FetchOutcome::Failed { reason };
    }

    let config = TransformConfig {
        return_format: ReturnFormat::Markdown,
        ..Default::default()
    };
    let content = transform_content(page, &config, &None, &None, &None);

    FetchOutcome::Rendered { content }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> FetchRequest {
        FetchRequest::new(url, 0, Duration::from_secs(5), ReadyCondition::Load)
    }

    fn unreachable_remote() -> SpiderEngine {
        SpiderEngine::new(EngineOptions {
            user_agent: None,
            chrome_connection_url: Some("ws://127.0.0.1:1/devtools/browser/none".to_string()),
        })
    }

    #[tokio::test]
    async fn test_fetch_before_start_raises() {
        let engine = SpiderEngine::new(EngineOptions::default());
        let result = engine.fetch(&request("https://docs.agno.com/a")).await;
        assert!(matches!(result, Err(EngineError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_rejects_blank_remote() {
        let engine = SpiderEngine::new(EngineOptions {
            user_agent: None,
            chrome_connection_url: Some("  ".to_string()),
        });
        assert!(engine.start().await.is_err());
        assert!(!engine.is_started().await);
    }

    #[tokio::test]
    async fn test_start_fails_without_a_browser() {
        let engine = unreachable_remote();
        let result = engine.start().await;
        assert!(matches!(
            result,
            Err(crate::crawler::errors::CrawlerError::Engine(EngineError::StartFailed(_)))
        ));
        assert!(!engine.is_started().await);

        let fetched = engine.fetch(&request("https://docs.agno.com/a")).await;
        assert!(matches!(fetched, Err(EngineError::NotStarted)));
    }

    #[tokio::test]
    async fn test_close_without_start_is_noop() {
        let engine = unreachable_remote();
        engine.close().await;
        engine.close().await;
        assert!(!engine.is_started().await);
    }

    #[test]
    fn test_rejection_reason() {
        assert_eq!(rejection_reason(404, "<html>gone</html>"), Some("HTTP status 404".to_string()));
        assert_eq!(rejection_reason(500, ""), Some("HTTP status 500".to_string()));
        assert_eq!(rejection_reason(200, "  \n "), Some("empty document".to_string()));
        assert_eq!(rejection_reason(204, ""), Some("empty document".to_string()));
        assert_eq!(rejection_reason(200, "<html><body>ok</body></html>"), None);
    }
}

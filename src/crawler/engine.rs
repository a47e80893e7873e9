//! Contract between the batch dispatcher and whatever renders pages.
//!
//! The engine owns browser automation, JavaScript execution, waiting for the
//! page to settle and HTML-to-markdown conversion. The dispatcher only sees
//! [`FetchOutcome`] values and raised [`EngineError`]s.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::errors::{CrawlerResult, EngineError};

/// When a rendered page is considered loaded enough to extract content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyCondition {
    Load,
    DomContentLoaded,
    #[default]
    NetworkIdle,
}

impl FromStr for ReadyCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(ReadyCondition::Load),
            "domcontentloaded" => Ok(ReadyCondition::DomContentLoaded),
            "networkidle" | "networkidle0" | "networkidle2" => Ok(ReadyCondition::NetworkIdle),
            other => Err(format!("unknown ready condition: {}", other)),
        }
    }
}

impl fmt::Display for ReadyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyCondition::Load => "load",
            ReadyCondition::DomContentLoaded => "domcontentloaded",
            ReadyCondition::NetworkIdle => "networkidle",
        };
        f.write_str(name)
    }
}

/// A single page fetch as submitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Isolates browser state between concurrent requests
    pub session_id: String,
    pub timeout: Duration,
    pub ready: ReadyCondition,
}

impl FetchRequest {
    /// `index` is the URL's position in the whole run, not within its batch.
    pub fn new(url: &str, index: usize, timeout: Duration, ready: ReadyCondition) -> Self {
        Self {
            url: url.to_string(),
            session_id: session_id_for(index),
            timeout,
            ready,
        }
    }
}

pub fn session_id_for(index: usize) -> String {
    format!("session_{}", index)
}

/// Structured result reported by an engine that did not raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Rendered { content: String },
    Failed { reason: String },
}

#[async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Acquire the shared browser resources. Called once per run.
    async fn start(&self) -> CrawlerResult<()>;

    /// Render one page. `Err` means the fetch raised rather than failing cleanly.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, EngineError>;

    /// Release everything acquired by `start`. Must be safe to call after a failed run.
    async fn close(&self);
}

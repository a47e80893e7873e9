use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::crawler::engine::ReadyCondition;
use crate::crawler::errors::{ConfigurationError, CrawlerResult};
use crate::crawler::logging::parse_log_level;

/// YAML files checked, in order, before environment overrides are applied.
const YAML_CANDIDATES: [&str; 2] = ["config/app.yaml", "app.yaml"];

/// Local environment file read on top of the YAML layer.
const DOTENV_FILE: &str = ".env";

/// Ceiling for `REQUEST_STAGGER_MS`; one minute between submissions.
pub const MAX_REQUEST_STAGGER_MS: u64 = 60_000;

/// Runtime settings for a crawl run.
///
/// Layered lowest to highest: built-in defaults, an optional YAML file, a local
/// `.env` file, then process environment variables (`BATCH_SIZE`, `OUTPUT_DIR`,
/// `LOG_LEVEL`, `PAGE_TIMEOUT`, `WAIT_UNTIL`, `BASE_URL`, `SITEMAP_FILE`,
/// `REQUEST_STAGGER_MS`, `USER_AGENT`, `CHROME_CONNECTION_URL`).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Default concurrency offered at the batch size prompt
    pub batch_size: usize,
    /// Root of the mirrored output tree
    pub output_dir: String,
    pub log_level: String,
    /// Per-page timeout in milliseconds
    pub page_timeout: u64,
    /// Page-ready condition (`load`, `domcontentloaded`, `networkidle`)
    pub wait_until: String,
    /// Prefix stripped from every URL when deriving output paths
    pub base_url: String,
    /// Sitemap file, resolved next to the executable when relative
    pub sitemap_file: String,
    /// Delay between request submissions inside one batch
    pub request_stagger_ms: u64,
    pub user_agent: Option<String>,
    /// Attach to an already running browser instead of launching one
    pub chrome_connection_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            output_dir: "./output".to_string(),
            log_level: "INFO".to_string(),
            page_timeout: 60_000,
            wait_until: "networkidle".to_string(),
            base_url: "https://docs.agno.com/".to_string(),
            sitemap_file: "sitemap.xml".to_string(),
            request_stagger_ms: 500,
            user_agent: None,
            chrome_connection_url: None,
        }
    }
}

impl Settings {
    /// Load every layer from the current working directory and process environment.
    pub fn load() -> CrawlerResult<Self> {
        let mut settings = Self::load_yaml_or_default(&YAML_CANDIDATES);

        let dotenv = read_dotenv(Path::new(DOTENV_FILE));
        settings.apply_overrides(|key| env::var(key).ok().or_else(|| dotenv.get(key).cloned()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn load_from_yaml(file_path: &Path) -> CrawlerResult<Self> {
        let content = fs::read_to_string(file_path).map_err(|e| {
            ConfigurationError::ParseError(format!("{}: {}", file_path.display(), e))
        })?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// First readable candidate wins; unreadable or invalid files fall back to defaults.
    pub fn load_yaml_or_default<P: AsRef<Path>>(candidates: &[P]) -> Self {
        for candidate in candidates {
            let path = candidate.as_ref();
            if !path.exists() {
                continue;
            }
            match Self::load_from_yaml(path) {
                Ok(settings) => {
                    log::info!("[config] loaded {}", path.display());
                    return settings;
                }
                Err(e) => {
                    log::warn!("[config] failed to load {}: {}", path.display(), e);
                }
            }
        }
        log::debug!("[config] no settings file found, using defaults");
        Self::default()
    }

    /// Apply `KEY=value` overrides from `lookup`; unset keys keep their current value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CrawlerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BATCH_SIZE") {
            self.batch_size = parse_value("BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("PAGE_TIMEOUT") {
            self.page_timeout = parse_value("PAGE_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("WAIT_UNTIL") {
            self.wait_until = v;
        }
        if let Some(v) = lookup("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("SITEMAP_FILE") {
            self.sitemap_file = v;
        }
        if let Some(v) = lookup("REQUEST_STAGGER_MS") {
            self.request_stagger_ms = parse_value("REQUEST_STAGGER_MS", &v)?;
        }
        if let Some(v) = lookup("USER_AGENT") {
            self.user_agent = non_empty(v);
        }
        if let Some(v) = lookup("CHROME_CONNECTION_URL") {
            self.chrome_connection_url = non_empty(v);
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> CrawlerResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "BATCH_SIZE must be greater than 0".to_string(),
            )
            .into());
        }
        if self.page_timeout == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "PAGE_TIMEOUT must be greater than 0".to_string(),
            )
            .into());
        }
        if self.request_stagger_ms > MAX_REQUEST_STAGGER_MS {
            return Err(ConfigurationError::ValidationFailed(format!(
                "REQUEST_STAGGER_MS must be at most {}",
                MAX_REQUEST_STAGGER_MS
            ))
            .into());
        }
        if self.output_dir.trim().is_empty() {
            return Err(ConfigurationError::ValidationFailed(
                "OUTPUT_DIR cannot be empty".to_string(),
            )
            .into());
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigurationError::ValidationFailed(
                "BASE_URL cannot be empty".to_string(),
            )
            .into());
        }
        if parse_log_level(&self.log_level).is_none() {
            return Err(ConfigurationError::InvalidLogLevel(self.log_level.clone()).into());
        }
        self.ready_condition()?;
        Ok(())
    }

    pub fn ready_condition(&self) -> CrawlerResult<ReadyCondition> {
        ReadyCondition::from_str(&self.wait_until).map_err(|_| {
            ConfigurationError::InvalidValue {
                key: "WAIT_UNTIL".to_string(),
                value: self.wait_until.clone(),
            }
            .into()
        })
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout)
    }

    pub fn request_stagger(&self) -> Duration {
        Duration::from_millis(self.request_stagger_ms)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    /// Resolve the sitemap file relative to the running executable, falling
    /// back to the working directory when no file sits next to the binary.
    pub fn sitemap_path(&self) -> PathBuf {
        let configured = PathBuf::from(&self.sitemap_file);
        if configured.is_absolute() {
            return configured;
        }

        let beside_exe = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&configured)));

        match beside_exe {
            Some(path) if path.exists() => path,
            Some(path) if !configured.exists() => path,
            _ => configured,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> CrawlerResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

/// Read `KEY=value` pairs from a dotenv file; a missing or unreadable file yields nothing.
pub fn read_dotenv(path: &Path) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(_) => return values,
    };
    for item in iter {
        match item {
            Ok((key, value)) => {
                values.insert(key, value);
            }
            Err(e) => {
                log::warn!("[config] skipping malformed line in {}: {}", path.display(), e);
            }
        }
    }
    values
}

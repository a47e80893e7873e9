use std::fmt;
use std::time::Duration;

/// Error types for the sitemap crawler
#[derive(Debug)]
pub enum CrawlerError {
    /// Reading or parsing the sitemap document
    Sitemap(SitemapError),
    /// Crawl engine lifecycle and per-page fetch errors
    Engine(EngineError),
    /// Output tree errors
    FileOperation(FileOperationError),
    /// Settings loading and validation
    Configuration(ConfigurationError),
    /// Console input and output
    Io(std::io::Error),
}

#[derive(Debug)]
pub enum SitemapError {
    FileReadFailed(std::io::Error),
    ParseError(String),
    MalformedDocument(String),
}

#[derive(Debug)]
pub enum EngineError {
    StartFailed(String),
    NotStarted,
    RequestFailed { url: String, reason: String },
    Timeout { url: String, after: Duration },
}

#[derive(Debug)]
pub enum FileOperationError {
    DirectoryCreationFailed(std::io::Error),
    FileWriteFailed(std::io::Error),
    InvalidPath(String),
}

#[derive(Debug)]
pub enum ConfigurationError {
    ParseError(String),
    InvalidValue { key: String, value: String },
    ValidationFailed(String),
    InvalidLogLevel(String),
}

impl fmt::Display for CrawlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerError::Sitemap(e) => write!(f, "Sitemap error: {}", e),
            CrawlerError::Engine(e) => write!(f, "Crawl engine error: {}", e),
            CrawlerError::FileOperation(e) => write!(f, "File operation error: {}", e),
            CrawlerError::Configuration(e) => write!(f, "Configuration error: {}", e),
            CrawlerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl fmt::Display for SitemapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SitemapError::FileReadFailed(e) => write!(f, "Failed to read sitemap file: {}", e),
            SitemapError::ParseError(msg) => write!(f, "XML parsing failed: {}", msg),
            SitemapError::MalformedDocument(msg) => write!(f, "Malformed sitemap document: {}", msg),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::StartFailed(msg) => write!(f, "Failed to start crawl engine: {}", msg),
            EngineError::NotStarted => write!(f, "Crawl engine has not been started"),
            EngineError::RequestFailed { url, reason } => {
                write!(f, "Request failed for {}: {}", url, reason)
            }
            EngineError::Timeout { url, after } => {
                write!(f, "Page timeout after {:?} for: {}", after, url)
            }
        }
    }
}

impl fmt::Display for FileOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperationError::DirectoryCreationFailed(e) => {
                write!(f, "Failed to create directory: {}", e)
            }
            FileOperationError::FileWriteFailed(e) => write!(f, "Failed to write file: {}", e),
            FileOperationError::InvalidPath(path) => write!(f, "Invalid file path: {}", path),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::ParseError(msg) => write!(f, "Configuration parse error: {}", msg),
            ConfigurationError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
            ConfigurationError::ValidationFailed(msg) => {
                write!(f, "Configuration validation failed: {}", msg)
            }
            ConfigurationError::InvalidLogLevel(level) => {
                write!(f, "Invalid log level: {}", level)
            }
        }
    }
}

impl std::error::Error for CrawlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlerError::Sitemap(SitemapError::FileReadFailed(e)) => Some(e),
            CrawlerError::FileOperation(FileOperationError::DirectoryCreationFailed(e)) => Some(e),
            CrawlerError::FileOperation(FileOperationError::FileWriteFailed(e)) => Some(e),
            CrawlerError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for SitemapError {}
impl std::error::Error for EngineError {}
impl std::error::Error for FileOperationError {}
impl std::error::Error for ConfigurationError {}

impl From<std::io::Error> for CrawlerError {
    fn from(err: std::io::Error) -> Self {
        CrawlerError::Io(err)
    }
}

impl From<quick_xml::Error> for CrawlerError {
    fn from(err: quick_xml::Error) -> Self {
        CrawlerError::Sitemap(SitemapError::ParseError(err.to_string()))
    }
}

impl From<serde_yaml::Error> for CrawlerError {
    fn from(err: serde_yaml::Error) -> Self {
        CrawlerError::Configuration(ConfigurationError::ParseError(err.to_string()))
    }
}

impl From<SitemapError> for CrawlerError {
    fn from(err: SitemapError) -> Self {
        CrawlerError::Sitemap(err)
    }
}

impl From<EngineError> for CrawlerError {
    fn from(err: EngineError) -> Self {
        CrawlerError::Engine(err)
    }
}

impl From<FileOperationError> for CrawlerError {
    fn from(err: FileOperationError) -> Self {
        CrawlerError::FileOperation(err)
    }
}

impl From<ConfigurationError> for CrawlerError {
    fn from(err: ConfigurationError) -> Self {
        CrawlerError::Configuration(err)
    }
}

/// Result type alias for crawler operations
pub type CrawlerResult<T> = Result<T, CrawlerError>;

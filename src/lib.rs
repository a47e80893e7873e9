pub mod config;
pub mod crawler;

pub use config::config::Settings;
pub use crawler::crawler::{Driver, RunOutcome};
pub use crawler::errors::{CrawlerError, CrawlerResult};

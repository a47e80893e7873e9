use std::io;

use sitemap_crawler::Settings;
use sitemap_crawler::crawler::crawler::Driver;
use sitemap_crawler::crawler::logging::init_logging;
use sitemap_crawler::crawler::memory::ProcessMemory;
use sitemap_crawler::crawler::spider_engine::{EngineOptions, SpiderEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.log_level)?;

    let sitemap_path = settings.sitemap_path();
    log::info!("Reading sitemap from {}", sitemap_path.display());

    let engine = SpiderEngine::new(EngineOptions {
        user_agent: settings.user_agent.clone(),
        chrome_connection_url: settings.chrome_connection_url.clone(),
    });

    let mut driver = Driver::new(&settings, &engine, ProcessMemory::new());
    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();
    driver.run(&sitemap_path, &mut input, &mut output).await?;

    Ok(())
}

// Sitemap crawler pipeline: sitemap -> dispatcher -> engine -> file manager
pub mod crawler;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod file_manager;
pub mod logging;
pub mod memory;
pub mod sitemap;
pub mod spider_engine;

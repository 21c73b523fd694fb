pub mod chrome;
pub mod cli;
pub mod config;
pub mod delay_manager;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod listing;
pub mod logger;
pub mod report;
pub mod runner;
pub mod scraper;
pub mod session;
pub mod static_pages;

// Exporting types for convenience
pub use config::{ScraperConfig, Variant};
pub use driver::{Driver, DriverError, Selector};
pub use error::ScrapeError;
pub use report::{ExtractedRow, ReportLayout};
pub use runner::{run, RunSummary};

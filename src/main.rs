use token_scraper_lib::chrome::ChromeDriver;
use token_scraper_lib::cli::CommandLine;
use token_scraper_lib::delay_manager::SystemClock;
use token_scraper_lib::static_pages::StaticPages;
use token_scraper_lib::{logger, runner, Driver, RunSummary, ScrapeError, ScraperConfig, Variant};

use log::{error, info, warn};
use std::error::Error;

fn drive<D: Driver>(driver: &mut D, config: &ScraperConfig, variant: &Variant) -> Result<RunSummary, ScrapeError> {
    let result = runner::run(driver, &SystemClock, config, variant);
    info!("Closing browser session...");
    if let Err(e) = driver.close() {
        warn!("Browser did not close cleanly: {}", e);
    }
    result
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = CommandLine::parse_args();
    let (config, load_error) = cli.load_config();

    logger::init(&config.output.log_file, cli.verbose);
    info!("--- GitHub Token Scraper Initializing ---");
    if let Some(e) = load_error {
        error!("Fatal: {}", e);
        return Err(e.into());
    }
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {:?}", path);
    }

    let variant = cli.variant();
    let result = match &cli.replay {
        Some(dir) => {
            info!("Replaying saved pages from {:?}", dir);
            StaticPages::from_dir(dir).and_then(|mut pages| drive(&mut pages, &config, &variant))
        }
        None => ChromeDriver::launch(&config.browser)
            .map_err(ScrapeError::from)
            .and_then(|mut chrome| drive(&mut chrome, &config, &variant)),
    };

    info!("--- GitHub Token Scraper Finished ---");
    match result {
        Ok(summary) => {
            info!("Report: {:?}", summary.report_path);
            Ok(())
        }
        Err(e) => {
            error!("Fatal: {}", e);
            Err(e.into())
        }
    }
}

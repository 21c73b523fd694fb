use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::driver::DriverError;

/// Errors that end a run.
///
/// Everything recoverable (a missing row field, a detail page that will not
/// load, a missing next-page link) is logged and absorbed where it happens and
/// never becomes a `ScrapeError`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("timed out after {}s waiting for an authenticated session on {url}", .waited.as_secs())]
    AuthTimedOut { url: String, waited: Duration },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("failed to write report {}: {source}", .path.display())]
    Report { path: PathBuf, source: csv::Error },

    #[error("i/o error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("invalid configuration: {0}")]
    Config(String),
}

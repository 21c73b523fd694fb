use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::{DetailSelectors, SENTINEL_EXPIRATION, SENTINEL_NAME, UNNAMED_TOKEN};
use crate::delay_manager::Clock;
use crate::driver::{Driver, DriverError};
use crate::extractor::{markup_preview, Extractor};
use crate::report::ExtractedRow;
use crate::session::{wait_for, wait_until};

/// What one row yielded before defaults are applied.
///
/// Missing fields are normal on these pages, so they are plain `None`s
/// rather than errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub name: Option<String>,
    pub expiration: Option<String>,
}

impl RawRow {
    pub fn into_row(self, subject: &str) -> ExtractedRow {
        let name = match self.name {
            Some(name) if name.is_empty() => UNNAMED_TOKEN.to_string(),
            Some(name) => name,
            None => SENTINEL_NAME.to_string(),
        };
        ExtractedRow {
            subject: subject.to_string(),
            name,
            expiration: self.expiration.unwrap_or_else(|| SENTINEL_EXPIRATION.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DetailError {
    #[error("page did not load: {0}")]
    Load(#[from] DriverError),

    #[error("redirected to {0}")]
    Redirected(String),
}

/// Result of visiting one subject's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectOutcome {
    Extracted(Vec<ExtractedRow>),
    /// The page loaded but the expected section was not there.
    NoSection,
    /// The page could not be scraped; its markup was dumped for inspection.
    Failed(String),
}

impl SubjectOutcome {
    pub fn rows(&self) -> &[ExtractedRow] {
        match self {
            SubjectOutcome::Extracted(rows) => rows,
            _ => &[],
        }
    }
}

/// Scrapes credential rows from detail pages.
pub struct Scraper<'a> {
    selectors: &'a DetailSelectors,
    extractor: Extractor,
    clock: &'a dyn Clock,
    element_timeout: Duration,
    poll_interval: Duration,
    debug_dir: PathBuf,
}

impl<'a> Scraper<'a> {
    pub fn new(
        selectors: &'a DetailSelectors,
        clock: &'a dyn Clock,
        element_timeout: Duration,
        poll_interval: Duration,
        debug_dir: &Path,
    ) -> Self {
        Scraper {
            selectors,
            extractor: Extractor::new(),
            clock,
            element_timeout,
            // Element waits poll faster than the login wait.
            poll_interval: poll_interval.min(Duration::from_secs(1)),
            debug_dir: debug_dir.to_path_buf(),
        }
    }

    /// Scrapes `subject`'s page at `url`.
    ///
    /// Any failure specific to this page is logged and reported through the
    /// outcome; only a lost browser session is returned as `Err`.
    pub fn scrape_subject<D: Driver>(
        &self,
        driver: &mut D,
        subject: &str,
        url: &str,
    ) -> Result<SubjectOutcome, DriverError> {
        info!("Scraping tokens for '{}' from {}", subject, url);
        match self.extract_rows(driver, url) {
            Ok(Some(raw)) => {
                let rows: Vec<ExtractedRow> = raw.into_iter().map(|r| r.into_row(subject)).collect();
                for row in &rows {
                    info!("  Scraped: Name='{}', Expiry='{}'", row.name, row.expiration);
                }
                Ok(SubjectOutcome::Extracted(rows))
            }
            Ok(None) => Ok(SubjectOutcome::NoSection),
            Err(DetailError::Load(e)) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("Failed to scrape '{}': {}", subject, e);
                self.dump_page(driver, subject);
                Ok(SubjectOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Loads `url` and reads every row of the configured section.
    ///
    /// `Ok(None)` means the page loaded without the section heading.
    pub fn extract_rows<D: Driver>(&self, driver: &mut D, url: &str) -> Result<Option<Vec<RawRow>>, DetailError> {
        driver.navigate(url)?;
        let landed = driver.current_url()?;
        if is_login_page(&landed) {
            return Err(DetailError::Redirected(landed));
        }

        let heading = wait_for(
            driver,
            self.clock,
            &self.selectors.section_heading,
            self.element_timeout,
            self.poll_interval,
        )?;
        if heading.is_none() {
            warn!(
                "Section {} not found on {}; recording no tokens for this page.",
                self.selectors.section_heading, url
            );
            return Ok(None);
        }

        let rows = self.wait_for_rows(driver)?;
        if rows.is_empty() {
            info!("No tokens found on {}.", url);
            return Ok(Some(Vec::new()));
        }
        info!("Found {} potential token entries.", rows.len());

        let mut raw_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            raw_rows.push(self.read_row(driver, row)?);
        }
        Ok(Some(raw_rows))
    }

    /// Rows inside the section container, waiting up to the element timeout
    /// for them to render. An empty result after the wait means no tokens.
    fn wait_for_rows<D: Driver>(&self, driver: &mut D) -> Result<Vec<D::Element>, DriverError> {
        let selectors = self.selectors;
        let rows = wait_until(driver, self.clock, self.element_timeout, self.poll_interval, |driver| {
            let Some(section) = driver.find(&selectors.section)? else {
                return Ok(None);
            };
            let rows = driver.find_all_within(&section, &selectors.row)?;
            Ok(Some(rows).filter(|rows| !rows.is_empty()))
        })?;
        Ok(rows.unwrap_or_default())
    }

    fn read_row<D: Driver>(&self, driver: &mut D, row: &D::Element) -> Result<RawRow, DriverError> {
        let name_el = soft(driver.find_within(row, &self.selectors.name), "name lookup")?.flatten();
        let name = match name_el {
            Some(el) => soft(driver.text(&el), "name text")?,
            None => None,
        };
        if name.is_none() {
            let markup = soft(driver.outer_html(row), "row markup")?.unwrap_or_default();
            warn!("Could not find token name element for a row. Row HTML: {}", markup_preview(&markup));
        }

        let mut expiration = None;
        if let Some(el) = soft(driver.find_within(row, &self.selectors.expiration), "expiration lookup")?.flatten() {
            if let Some(datetime) = soft(driver.attribute(&el, "datetime"), "datetime attribute")?.flatten() {
                expiration = self.extractor.format_datetime(&datetime);
            }
            if expiration.is_none() {
                if let Some(text) = soft(driver.text(&el), "expiration text")? {
                    expiration = self
                        .extractor
                        .expiry_from_text(&text)
                        .or_else(|| self.extractor.date_from_text(&text));
                }
            }
        }
        if expiration.is_none() {
            let candidates = soft(
                driver.find_all_within(row, &self.selectors.expiration_text),
                "expiration fallback",
            )?
            .unwrap_or_default();
            for el in &candidates {
                if let Some(text) = soft(driver.text(el), "expiration fallback text")? {
                    if let Some(found) = self.extractor.expiry_from_text(&text) {
                        expiration = Some(found);
                        break;
                    }
                }
            }
        }
        if expiration.is_none() {
            debug!(
                "No expiration found for token '{}'",
                name.as_deref().unwrap_or(SENTINEL_NAME)
            );
        }

        Ok(RawRow { name, expiration })
    }

    /// Saves the current page's markup as `<debug_dir>/<subject>.html`.
    fn dump_page<D: Driver>(&self, driver: &mut D, subject: &str) {
        let source = match driver.page_source() {
            Ok(source) => source,
            Err(e) => {
                warn!("Could not capture page source for '{}': {}", subject, e);
                return;
            }
        };
        let path = dump_path(&self.debug_dir, subject);
        if let Err(e) = fs::create_dir_all(&self.debug_dir).and_then(|_| fs::write(&path, source)) {
            warn!("Could not write debug dump {:?}: {}", path, e);
            return;
        }
        info!("Saved page markup for '{}' to {:?}", subject, path);
    }
}

/// Turns a non-fatal driver error into `None` after logging it.
fn soft<T>(result: Result<T, DriverError>, what: &str) -> Result<Option<T>, DriverError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Row {} failed: {}", what, e);
            Ok(None)
        }
    }
}

fn is_login_page(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    path == "/login" || path.starts_with("/login/") || path.starts_with("/session")
}

/// Debug dump location for `subject`; path-unsafe characters become `_`.
pub fn dump_path(debug_dir: &Path, subject: &str) -> PathBuf {
    let mut stem: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        stem.push('_');
    }
    debug_dir.join(format!("{}.html", stem))
}

use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::delay_manager::{self, Clock};
use crate::driver::{Driver, DriverError, Selector};
use crate::extractor::Extractor;

/// Walks a paginated member listing and collects one identifier per entry.
pub struct ListingWalker<'a> {
    pub item: &'a Selector,
    pub next_page: &'a Selector,
    pub max_pages: usize,
    pub page_delay: (Duration, Duration),
    pub clock: &'a dyn Clock,
}

impl<'a> ListingWalker<'a> {
    /// Identifiers across all pages, first-seen order, without duplicates.
    ///
    /// The walk ends when the next-page control is missing or disabled, or
    /// when following it fails; none of those are errors. An empty page does
    /// not end the walk. Only a lost browser session is returned as `Err`.
    pub fn collect_all_identifiers<D: Driver>(
        &self,
        driver: &mut D,
        extractor: &Extractor,
        listing_url: &str,
    ) -> Result<Vec<String>, DriverError> {
        let mut identifiers = Vec::new();
        let mut seen = HashSet::new();
        let mut visited_pages = HashSet::new();

        info!("Collecting members from {}", listing_url);
        if let Err(e) = driver.navigate(listing_url) {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Could not load listing {}: {}", listing_url, e);
            return Ok(identifiers);
        }
        visited_pages.insert(driver.current_url().unwrap_or_else(|_| listing_url.to_string()));

        let mut page_no = 1;
        loop {
            let items = match driver.find_all(self.item) {
                Ok(items) => items,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Listing page {}: item lookup failed: {}", page_no, e);
                    Vec::new()
                }
            };

            let mut added = 0;
            for item in &items {
                match identifier_of(driver, extractor, item) {
                    Ok(Some(id)) => {
                        if seen.insert(id.clone()) {
                            identifiers.push(id);
                            added += 1;
                        }
                    }
                    Ok(None) => debug!("Listing page {}: entry without identifier skipped", page_no),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("Listing page {}: could not read entry: {}", page_no, e),
                }
            }
            info!("Listing page {}: {} entries, {} new members.", page_no, items.len(), added);

            let next = match driver.find(self.next_page) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    info!("No next page control; listing complete.");
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Next page lookup failed, ending listing: {}", e);
                    break;
                }
            };
            if is_disabled(driver, &next)? {
                info!("Next page control is disabled; listing complete.");
                break;
            }
            if page_no >= self.max_pages {
                warn!("Stopping listing after {} pages.", self.max_pages);
                break;
            }

            delay_manager::page_delay(self.clock, self.page_delay.0, self.page_delay.1);

            match follow(driver, &next, &visited_pages) {
                Ok(Some(url)) => {
                    visited_pages.insert(url);
                }
                Ok(None) => {
                    warn!("Next page points back to a visited page; listing complete.");
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Could not open listing page {}: {}", page_no + 1, e);
                    break;
                }
            }
            page_no += 1;
        }

        info!("Collected {} members across {} pages.", identifiers.len(), page_no);
        Ok(identifiers)
    }
}

fn identifier_of<D: Driver>(
    driver: &mut D,
    extractor: &Extractor,
    item: &D::Element,
) -> Result<Option<String>, DriverError> {
    if let Some(href) = driver.attribute(item, "href")? {
        if let Some(id) = extractor.identifier_from_href(&href) {
            return Ok(Some(id));
        }
    }
    let text = driver.text(item)?;
    Ok(Some(text).filter(|t| !t.is_empty()))
}

fn is_disabled<D: Driver>(driver: &mut D, element: &D::Element) -> Result<bool, DriverError> {
    let lookup = |driver: &mut D, name: &str| match driver.attribute(element, name) {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(_) => Ok(None),
    };
    let class_disabled = lookup(driver, "class")?
        .map(|class| class.split_whitespace().any(|c| c == "disabled"))
        .unwrap_or(false);
    let aria_disabled = lookup(driver, "aria-disabled")?.as_deref() == Some("true");
    let disabled_attr = lookup(driver, "disabled")?.is_some();
    Ok(class_disabled || aria_disabled || disabled_attr)
}

/// Opens the page behind `next`, returning its URL, or `None` when it was
/// already visited.
fn follow<D: Driver>(
    driver: &mut D,
    next: &D::Element,
    visited: &HashSet<String>,
) -> Result<Option<String>, DriverError> {
    let href = driver.attribute(next, "href")?;
    match href {
        Some(href) => {
            let base = driver.current_url()?;
            let target = Url::parse(&base)
                .and_then(|base| base.join(&href))
                .map(String::from)
                .unwrap_or(href);
            if visited.contains(&target) {
                return Ok(None);
            }
            driver.navigate(&target)?;
        }
        None => driver.click(next)?,
    }
    let landed = driver.current_url()?;
    if visited.contains(&landed) {
        return Ok(None);
    }
    Ok(Some(landed))
}

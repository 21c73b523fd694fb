use log::{error, info};
use std::path::PathBuf;

use crate::config::{render_url, ScraperConfig, Variant};
use crate::delay_manager::{self, Clock};
use crate::driver::Driver;
use crate::error::ScrapeError;
use crate::extractor::Extractor;
use crate::listing::ListingWalker;
use crate::report::{write_report, ExtractedRow, ReportLayout};
use crate::scraper::{Scraper, SubjectOutcome};
use crate::session::await_authenticated_entry;

/// Subject recorded for rows of the single-account variant.
pub const SINGLE_ACCOUNT_SUBJECT: &str = "self";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    AwaitingAuth,
    Listing,
    ExtractingDetail,
    Reporting,
    Done,
}

fn enter(state: RunState) {
    info!("run_state={:?}", state);
}

/// What a completed run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub rows: Vec<ExtractedRow>,
    pub report_path: PathBuf,
    pub subjects_visited: usize,
    /// Subjects whose page had no credential section.
    pub without_section: Vec<String>,
    /// Subjects whose page could not be scraped.
    pub failed: Vec<String>,
}

/// Runs one audit from login to report.
///
/// An authentication timeout aborts before any report is written. A fatal
/// error after that still writes whatever was collected, then is returned.
pub fn run<D: Driver>(
    driver: &mut D,
    clock: &dyn Clock,
    config: &ScraperConfig,
    variant: &Variant,
) -> Result<RunSummary, ScrapeError> {
    enter(RunState::Init);
    let selectors = &config.selectors;
    let timing = &config.timing;
    let (entry_url, marker, layout) = match variant {
        Variant::Org { org } => (
            render_url(&config.urls.people, org, ""),
            &selectors.people_marker,
            ReportLayout::PerUser,
        ),
        Variant::Pats => (
            config.urls.tokens.clone(),
            &selectors.pats.section_heading,
            ReportLayout::SingleAccount,
        ),
    };
    let mut summary = RunSummary {
        report_path: config.output.report_for(variant),
        ..RunSummary::default()
    };

    enter(RunState::AwaitingAuth);
    await_authenticated_entry(
        driver,
        clock,
        &entry_url,
        marker,
        timing.auth_timeout(),
        timing.poll_interval(),
        timing.element_timeout(),
    )?;

    let collected = collect(driver, clock, config, variant, &entry_url, &mut summary);

    enter(RunState::Reporting);
    write_report(&summary.rows, layout, &summary.report_path)?;

    if let Err(e) = collected {
        error!("Aborting after fatal error: {}. Partial results were written.", e);
        return Err(e);
    }

    info!(
        "Scraping Completed. Visited {} pages: {} tokens, {} without a token section, {} failed.",
        summary.subjects_visited,
        summary.rows.len(),
        summary.without_section.len(),
        summary.failed.len()
    );
    enter(RunState::Done);
    Ok(summary)
}

fn collect<D: Driver>(
    driver: &mut D,
    clock: &dyn Clock,
    config: &ScraperConfig,
    variant: &Variant,
    entry_url: &str,
    summary: &mut RunSummary,
) -> Result<(), ScrapeError> {
    let selectors = &config.selectors;
    let timing = &config.timing;
    let extractor = Extractor::new();

    let (subjects, detail_selectors) = match variant {
        Variant::Org { org } => {
            enter(RunState::Listing);
            let walker = ListingWalker {
                item: &selectors.member_link,
                next_page: &selectors.next_page,
                max_pages: timing.max_pages,
                page_delay: timing.page_delay(),
                clock,
            };
            let subjects: Vec<(String, String)> = walker
                .collect_all_identifiers(driver, &extractor, entry_url)?
                .into_iter()
                .map(|id| {
                    let url = render_url(&config.urls.sso, org, &id);
                    (id, url)
                })
                .collect();
            (subjects, &selectors.sso)
        }
        Variant::Pats => (
            vec![(SINGLE_ACCOUNT_SUBJECT.to_string(), config.urls.tokens.clone())],
            &selectors.pats,
        ),
    };

    enter(RunState::ExtractingDetail);
    let scraper = Scraper::new(
        detail_selectors,
        clock,
        timing.element_timeout(),
        timing.poll_interval(),
        &config.output.debug_dir,
    );
    let (delay_min, delay_max) = timing.page_delay();
    let total = subjects.len();

    for (i, (subject, url)) in subjects.iter().enumerate() {
        if i > 0 {
            delay_manager::page_delay(clock, delay_min, delay_max);
        }
        info!("Processing {} / {} : {}", i + 1, total, subject);

        let outcome = scraper.scrape_subject(driver, subject, url)?;
        summary.subjects_visited += 1;
        match outcome {
            SubjectOutcome::Extracted(rows) => summary.rows.extend(rows),
            SubjectOutcome::NoSection => summary.without_section.push(subject.clone()),
            SubjectOutcome::Failed(_) => summary.failed.push(subject.clone()),
        }
    }
    Ok(())
}

use log::{debug, error, info, warn};
use std::time::Duration;

use crate::delay_manager::Clock;
use crate::driver::{Driver, DriverError, Selector};
use crate::error::ScrapeError;

/// Runs `check` until it yields a value or `timeout` passes.
///
/// Checks once before the first sleep, so a condition that already holds
/// costs no waiting. Lookup errors count as "not yet" unless they are fatal.
pub fn wait_until<D: Driver, T>(
    driver: &mut D,
    clock: &dyn Clock,
    timeout: Duration,
    interval: Duration,
    mut check: impl FnMut(&mut D) -> Result<Option<T>, DriverError>,
) -> Result<Option<T>, DriverError> {
    let start = clock.now();
    loop {
        match check(driver) {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Lookup failed while waiting: {}", e),
        }

        let waited = clock.now().duration_since(start);
        if waited >= timeout {
            return Ok(None);
        }
        clock.sleep(interval.min(timeout - waited));
    }
}

/// Polls `selector` until it matches or `timeout` passes.
pub fn wait_for<D: Driver>(
    driver: &mut D,
    clock: &dyn Clock,
    selector: &Selector,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<D::Element>, DriverError> {
    wait_until(driver, clock, timeout, interval, |driver| driver.find(selector))
}

/// Loads `entry_url` and waits until `marker` shows the user is signed in
/// and on the expected page.
///
/// If the first load lands elsewhere (typically a login redirect) the
/// browser is left alone so the user can sign in by hand; once the marker
/// appears the entry page is loaded again and re-checked within
/// `recheck_timeout`.
pub fn await_authenticated_entry<D: Driver>(
    driver: &mut D,
    clock: &dyn Clock,
    entry_url: &str,
    marker: &Selector,
    timeout: Duration,
    poll_interval: Duration,
    recheck_timeout: Duration,
) -> Result<(), ScrapeError> {
    info!("Navigating to {}...", entry_url);
    if let Err(e) = driver.navigate(entry_url) {
        if e.is_fatal() {
            return Err(e.into());
        }
        warn!("Initial load of {} failed: {}. Waiting for manual navigation.", entry_url, e);
    }

    if driver.find(marker).ok().flatten().is_some() {
        info!("Already signed in and on the target page.");
        return Ok(());
    }

    warn!("It seems you are not logged into GitHub in this browser session.");
    info!(
        "Please log in in the opened browser window. Waiting up to {} seconds...",
        timeout.as_secs()
    );

    if wait_for(driver, clock, marker, timeout, poll_interval)?.is_none() {
        error!("Timed out waiting for login or navigation to {}.", entry_url);
        return Err(ScrapeError::AuthTimedOut {
            url: entry_url.to_string(),
            waited: timeout,
        });
    }
    info!("Login detected. Reloading {}...", entry_url);

    if let Err(e) = driver.navigate(entry_url) {
        if e.is_fatal() {
            return Err(e.into());
        }
        warn!("Reload of {} failed: {}", entry_url, e);
    }
    if wait_for(driver, clock, marker, recheck_timeout, poll_interval)?.is_none() {
        error!("Signed in, but {} no longer shows {}.", entry_url, marker);
        return Err(ScrapeError::AuthTimedOut {
            url: entry_url.to_string(),
            waited: timeout,
        });
    }
    info!("Successfully on the target page.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay_manager::ManualClock;
    use crate::static_pages::StaticPages;

    const ENTRY: &str = "https://github.com/settings/tokens";
    const LOGIN: &str = "https://github.com/login";
    const TOKENS_PAGE: &str = "<html><body><h2>Personal access tokens (classic)</h2></body></html>";
    const LOGIN_PAGE: &str = "<html><body><h1>Sign in to GitHub</h1></body></html>";

    fn marker() -> Selector {
        Selector::css_text("h2", "Personal access tokens (classic)")
    }

    /// Lets the user "finish logging in" after a number of marker checks.
    struct LoginAfter {
        pages: StaticPages,
        checks_left: usize,
    }

    impl Driver for LoginAfter {
        type Element = <StaticPages as Driver>::Element;

        fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
            self.pages.navigate(url)
        }
        fn current_url(&mut self) -> Result<String, DriverError> {
            self.pages.current_url()
        }
        fn page_source(&mut self) -> Result<String, DriverError> {
            self.pages.page_source()
        }
        fn find_all(&mut self, selector: &Selector) -> Result<Vec<Self::Element>, DriverError> {
            if self.checks_left == 0 {
                self.pages.remove_redirect(ENTRY);
                self.pages.navigate(ENTRY)?;
            } else {
                self.checks_left -= 1;
            }
            self.pages.find_all(selector)
        }
        fn find_all_within(
            &mut self,
            parent: &Self::Element,
            selector: &Selector,
        ) -> Result<Vec<Self::Element>, DriverError> {
            self.pages.find_all_within(parent, selector)
        }
        fn text(&mut self, element: &Self::Element) -> Result<String, DriverError> {
            self.pages.text(element)
        }
        fn attribute(&mut self, element: &Self::Element, name: &str) -> Result<Option<String>, DriverError> {
            self.pages.attribute(element, name)
        }
        fn outer_html(&mut self, element: &Self::Element) -> Result<String, DriverError> {
            self.pages.outer_html(element)
        }
        fn click(&mut self, element: &Self::Element) -> Result<(), DriverError> {
            self.pages.click(element)
        }
    }

    fn redirected() -> StaticPages {
        StaticPages::new()
            .with_page(ENTRY, TOKENS_PAGE)
            .with_page(LOGIN, LOGIN_PAGE)
            .with_redirect(ENTRY, LOGIN)
    }

    #[test]
    fn already_signed_in_returns_without_waiting() {
        let mut driver = StaticPages::new().with_page(ENTRY, TOKENS_PAGE);
        let clock = ManualClock::new();
        await_authenticated_entry(
            &mut driver,
            &clock,
            ENTRY,
            &marker(),
            Duration::from_secs(300),
            Duration::from_secs(3),
            Duration::from_secs(20),
        )
        .unwrap();
        assert_eq!(clock.sleeps(), 0);
        assert_eq!(driver.visits(), [ENTRY]);
    }

    #[test]
    fn manual_login_is_awaited_then_entry_reloaded() {
        let mut driver = LoginAfter {
            pages: redirected(),
            checks_left: 4,
        };
        let clock = ManualClock::new();
        await_authenticated_entry(
            &mut driver,
            &clock,
            ENTRY,
            &marker(),
            Duration::from_secs(300),
            Duration::from_secs(3),
            Duration::from_secs(20),
        )
        .unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(9));
        assert_eq!(driver.pages.current_url().unwrap(), ENTRY);
        assert_eq!(driver.pages.visits().first().map(String::as_str), Some(ENTRY));
    }

    #[test]
    fn never_signing_in_times_out() {
        let mut driver = redirected();
        let clock = ManualClock::new();
        let err = await_authenticated_entry(
            &mut driver,
            &clock,
            ENTRY,
            &marker(),
            Duration::from_secs(300),
            Duration::from_secs(3),
            Duration::from_secs(20),
        )
        .unwrap_err();

        assert!(matches!(err, ScrapeError::AuthTimedOut { .. }));
        assert_eq!(clock.elapsed(), Duration::from_secs(300));
        assert_eq!(driver.current_url().unwrap(), LOGIN);
    }

    #[test]
    fn wait_for_checks_before_sleeping() {
        let mut driver = StaticPages::new().with_page(ENTRY, TOKENS_PAGE);
        driver.navigate(ENTRY).unwrap();
        let clock = ManualClock::new();
        let found = wait_for(&mut driver, &clock, &marker(), Duration::from_secs(20), Duration::from_secs(3)).unwrap();
        assert!(found.is_some());
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn wait_for_never_oversleeps_the_timeout() {
        let mut driver = StaticPages::new().with_page(LOGIN, LOGIN_PAGE);
        driver.navigate(LOGIN).unwrap();
        let clock = ManualClock::new();
        let found = wait_for(&mut driver, &clock, &marker(), Duration::from_secs(10), Duration::from_secs(3)).unwrap();
        assert!(found.is_none());
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }
}

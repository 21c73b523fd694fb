use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::Selector;
use crate::error::ScrapeError;

pub const SENTINEL_EXPIRATION: &str = "N/A (Not Found)";
pub const SENTINEL_NAME: &str = "N/A (Name Not Found)";
pub const UNNAMED_TOKEN: &str = "Unnamed Token";

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a run audits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// Every member of an organization, via their SSO credential pages.
    Org { org: String },
    /// The signed-in account's classic personal access tokens.
    Pats,
}

/// Everything a run needs, loaded once and passed down explicitly.
///
/// Every field has a default, so a config file only lists overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub urls: Urls,
    pub selectors: SelectorConfig,
    pub timing: Timing,
    pub browser: BrowserOptions,
    pub output: OutputPaths,
}

/// URL templates. `{org}` and `{identifier}` are substituted URL-encoded.
///
/// The SSO page sits under `people/` (`/orgs/{org}/people/{identifier}/sso`),
/// which is where GitHub serves it; the shorter `/orgs/{org}/{identifier}/sso`
/// form is not used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Urls {
    pub people: String,
    pub sso: String,
    pub tokens: String,
}

impl Default for Urls {
    fn default() -> Self {
        Urls {
            people: "https://github.com/orgs/{org}/people".into(),
            sso: "https://github.com/orgs/{org}/people/{identifier}/sso".into(),
            tokens: "https://github.com/settings/tokens".into(),
        }
    }
}

/// Selectors for one kind of detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSelectors {
    /// Heading whose presence proves we are on the right page.
    pub section_heading: Selector,
    /// Element enclosing the section's rows; rows elsewhere on the page are ignored.
    pub section: Selector,
    /// Looked up inside `section`.
    pub row: Selector,
    /// Looked up inside each row.
    pub name: Selector,
    /// Looked up inside each row; a `datetime` attribute wins over its text.
    pub expiration: Selector,
    /// Scanned for "No expiration" / "Expires on ..." when `expiration` is absent.
    pub expiration_text: Selector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Present once the people listing is shown to a signed-in member.
    pub people_marker: Selector,
    pub member_link: Selector,
    pub next_page: Selector,
    pub sso: DetailSelectors,
    pub pats: DetailSelectors,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig {
            people_marker: Selector::css("#org-members-table"),
            member_link: Selector::css("li[data-bulk-actions-id] a[data-hovercard-type=\"user\"]"),
            next_page: Selector::css(".pagination .next_page"),
            sso: DetailSelectors {
                section_heading: Selector::css_text("h2, h3", "Personal access tokens"),
                section: Selector::css_text("div.Box", "Personal access tokens"),
                row: Selector::css("div.Box-row"),
                name: Selector::css("strong"),
                expiration: Selector::css("relative-time"),
                expiration_text: Selector::css(".text-small span"),
            },
            pats: DetailSelectors {
                section_heading: Selector::css_text("h2", "Personal access tokens (classic)"),
                section: Selector::css("turbo-frame#js-settings-tokens-classic-PATs-table"),
                row: Selector::css("div.Box-row"),
                name: Selector::css("a > strong"),
                expiration: Selector::css("relative-time"),
                expiration_text: Selector::css(".flex-auto.text-right .text-small.text-gray span"),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub auth_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub element_timeout_secs: u64,
    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,
    pub max_pages: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            auth_timeout_secs: 300,
            poll_interval_secs: 3,
            element_timeout_secs: 20,
            page_delay_min_ms: 2000,
            page_delay_max_ms: 2000,
            max_pages: 500,
        }
    }
}

impl Timing {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Never shorter than [`MIN_POLL_INTERVAL`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs).max(MIN_POLL_INTERVAL)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn page_delay(&self) -> (Duration, Duration) {
        let min = Duration::from_millis(self.page_delay_min_ms);
        let max = Duration::from_millis(self.page_delay_max_ms.max(self.page_delay_min_ms));
        (min, max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    /// Chrome/Chromium binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    /// Reusing a profile keeps an existing GitHub login.
    pub user_data_dir: Option<PathBuf>,
    pub launch_timeout_secs: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        BrowserOptions {
            window_width: 1280,
            window_height: 800,
            user_agent: None,
            executable: None,
            user_data_dir: None,
            launch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    /// Defaults per variant, see [`OutputPaths::report_for`].
    pub report: Option<PathBuf>,
    pub log_file: PathBuf,
    pub debug_dir: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        OutputPaths {
            report: None,
            log_file: PathBuf::from("logs/scraper.log"),
            debug_dir: PathBuf::from("debug"),
        }
    }
}

impl OutputPaths {
    pub fn report_for(&self, variant: &Variant) -> PathBuf {
        match (&self.report, variant) {
            (Some(path), _) => path.clone(),
            (None, Variant::Org { .. }) => PathBuf::from("output/sso_credentials_report.csv"),
            (None, Variant::Pats) => PathBuf::from("output/classic_pats_report.csv"),
        }
    }
}

impl ScraperConfig {
    /// Defaults, overridden by the JSON file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ScrapeError> {
        let Some(path) = path else {
            return Ok(ScraperConfig::default());
        };
        let content = fs::read_to_string(path).map_err(|source| ScrapeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScraperConfig = serde_json::from_str(&content)
            .map_err(|e| ScrapeError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Fills `{org}` and `{identifier}` in a URL template.
pub fn render_url(template: &str, org: &str, identifier: &str) -> String {
    template
        .replace("{org}", &urlencoding::encode(org))
        .replace("{identifier}", &urlencoding::encode(identifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = ScraperConfig::load(None).unwrap();
        assert_eq!(config.timing.auth_timeout(), Duration::from_secs(300));
        assert_eq!(config.urls.tokens, "https://github.com/settings/tokens");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "timing": { "auth_timeout_secs": 60 },
                "selectors": { "next_page": { "css": "a[rel=next]" } }
            }"#,
        )
        .unwrap();

        let config = ScraperConfig::load(Some(&path)).unwrap();
        assert_eq!(config.timing.auth_timeout_secs, 60);
        assert_eq!(config.timing.poll_interval_secs, 3);
        assert_eq!(config.selectors.next_page, Selector::css("a[rel=next]"));
        assert_eq!(config.selectors.pats, SelectorConfig::default().pats);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ScraperConfig::load(Some(&path)), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn report_path_depends_on_variant() {
        let paths = OutputPaths::default();
        assert_eq!(paths.report_for(&Variant::Pats), PathBuf::from("output/classic_pats_report.csv"));
        let org = Variant::Org { org: "acme".into() };
        assert_eq!(paths.report_for(&org), PathBuf::from("output/sso_credentials_report.csv"));
    }

    #[test]
    fn templates_are_encoded() {
        let url = render_url("https://github.com/orgs/{org}/people/{identifier}/sso", "acme", "a b");
        assert_eq!(url, "https://github.com/orgs/acme/people/a%20b/sso");
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let timing = Timing {
            poll_interval_secs: 0,
            ..Timing::default()
        };
        assert_eq!(timing.poll_interval(), MIN_POLL_INTERVAL);
        assert_eq!(Timing::default().poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn inverted_delay_range_collapses() {
        let timing = Timing {
            page_delay_min_ms: 500,
            page_delay_max_ms: 100,
            ..Timing::default()
        };
        let (min, max) = timing.page_delay();
        assert_eq!(min, max);
    }
}

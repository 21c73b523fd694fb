use log::debug;
use scraper::{ElementRef, Html, Selector as CssSelector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use url::Url;

use crate::driver::{normalize_text, Driver, DriverError, Selector};
use crate::error::ScrapeError;

const MANIFEST_FILE: &str = "pages.json";
const MAX_REDIRECTS: usize = 10;

/// Handle to an element of a [`StaticPages`] document.
///
/// Holds the element's own markup, so lookups inside it only ever see its
/// descendants.
#[derive(Debug, Clone)]
pub struct StaticElement {
    html: String,
}

/// Offline driver serving fixed HTML documents by URL.
///
/// Unknown and explicitly failing URLs produce navigation errors. Redirects
/// are followed on `navigate`. XPath is not supported.
#[derive(Debug, Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    failing: HashSet<String>,
    current: Option<String>,
    visits: Vec<String>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.insert_page(url, html);
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn insert_page(&mut self, url: &str, html: &str) {
        self.pages.insert(url.to_string(), html.to_string());
    }

    pub fn remove_redirect(&mut self, from: &str) {
        self.redirects.remove(from);
    }

    /// Every URL passed to `navigate`, in order, including failed ones.
    pub fn visits(&self) -> &[String] {
        &self.visits
    }

    /// Loads saved pages from `dir`, using its `pages.json` manifest
    /// (`{"<url>": "<file name>"}`).
    pub fn from_dir(dir: &Path) -> Result<Self, ScrapeError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = fs::read_to_string(&manifest_path).map_err(|source| ScrapeError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let entries: HashMap<String, String> = serde_json::from_str(&manifest)
            .map_err(|e| ScrapeError::Config(format!("{}: {}", manifest_path.display(), e)))?;

        let mut pages = StaticPages::new();
        for (url, file) in entries {
            let path = dir.join(&file);
            let html = fs::read_to_string(&path).map_err(|source| ScrapeError::Io { path, source })?;
            pages.insert_page(&url, &html);
        }
        debug!("Loaded {} saved pages from {:?}", pages.pages.len(), dir);
        Ok(pages)
    }

    fn document(&self) -> Result<Html, DriverError> {
        let url = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::Command("no page loaded".into()))?;
        let html = self
            .pages
            .get(url)
            .ok_or_else(|| DriverError::Command(format!("page {} vanished", url)))?;
        Ok(Html::parse_document(html))
    }
}

fn compile(selector: &Selector) -> Result<(CssSelector, Option<&str>), DriverError> {
    let (css, contains) = match selector {
        Selector::Css(css) => (css, None),
        Selector::CssText { css, contains } => (css, Some(contains.as_str())),
        Selector::XPath(_) => return Err(DriverError::Unsupported("xpath")),
    };
    let compiled = CssSelector::parse(css).map_err(|_| DriverError::InvalidSelector(selector.to_string()))?;
    Ok((compiled, contains))
}

fn collect<'a>(found: impl Iterator<Item = ElementRef<'a>>, contains: Option<&str>) -> Vec<StaticElement> {
    found
        .filter(|el| match contains {
            Some(fragment) => normalize_text(&el.text().collect::<String>()).contains(fragment),
            None => true,
        })
        .map(|el| StaticElement { html: el.html() })
        .collect()
}

fn with_element<T>(element: &StaticElement, f: impl FnOnce(ElementRef<'_>) -> T) -> Result<T, DriverError> {
    let fragment = Html::parse_fragment(&element.html);
    let node = fragment
        .root_element()
        .children()
        .find_map(ElementRef::wrap)
        .ok_or_else(|| DriverError::Command("element markup did not parse".into()))?;
    Ok(f(node))
}

impl Driver for StaticPages {
    type Element = StaticElement;

    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.visits.push(url.to_string());

        let mut target = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            if self.failing.contains(&target) {
                return Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason: "connection failed".into(),
                });
            }
            match self.redirects.get(&target) {
                Some(next) => target = next.clone(),
                None => break,
            }
        }

        if !self.pages.contains_key(&target) {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "no such page".into(),
            });
        }
        self.current = Some(target);
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        self.current
            .clone()
            .ok_or_else(|| DriverError::Command("no page loaded".into()))
    }

    fn page_source(&mut self) -> Result<String, DriverError> {
        let url = self.current_url()?;
        self.pages
            .get(&url)
            .cloned()
            .ok_or_else(|| DriverError::Command(format!("page {} vanished", url)))
    }

    fn find_all(&mut self, selector: &Selector) -> Result<Vec<StaticElement>, DriverError> {
        let (compiled, contains) = compile(selector)?;
        let document = self.document()?;
        Ok(collect(document.select(&compiled), contains))
    }

    fn find_all_within(
        &mut self,
        parent: &StaticElement,
        selector: &Selector,
    ) -> Result<Vec<StaticElement>, DriverError> {
        let (compiled, contains) = compile(selector)?;
        with_element(parent, |scope| {
            let descendants = scope.select(&compiled).filter(|el| el.id() != scope.id());
            collect(descendants, contains)
        })
    }

    fn text(&mut self, element: &StaticElement) -> Result<String, DriverError> {
        with_element(element, |el| normalize_text(&el.text().collect::<String>()))
    }

    fn attribute(&mut self, element: &StaticElement, name: &str) -> Result<Option<String>, DriverError> {
        with_element(element, |el| el.value().attr(name).map(str::to_string))
    }

    fn outer_html(&mut self, element: &StaticElement) -> Result<String, DriverError> {
        Ok(element.html.clone())
    }

    fn click(&mut self, element: &StaticElement) -> Result<(), DriverError> {
        let href = self
            .attribute(element, "href")?
            .ok_or(DriverError::Unsupported("clicking an element without href"))?;
        let base = self.current_url()?;
        let target = Url::parse(&base)
            .and_then(|base| base.join(&href))
            .map_err(|e| DriverError::Navigation {
                url: href.clone(),
                reason: e.to_string(),
            })?;
        self.navigate(target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <h2>Personal access tokens (classic)</h2>
        <div class="Box-row"><a href="/t/1"><strong>deploy</strong></a><div class="Box-row">nested</div></div>
        <a class="next_page" href="/page/2">Next</a>
    </body></html>"#;

    fn pages() -> StaticPages {
        StaticPages::new()
            .with_page("https://example.test/page/1", PAGE)
            .with_page("https://example.test/page/2", "<html><body><p>two</p></body></html>")
            .with_redirect("https://example.test/start", "https://example.test/page/1")
    }

    #[test]
    fn follows_redirects_and_records_visits() {
        let mut driver = pages();
        driver.navigate("https://example.test/start").unwrap();
        assert_eq!(driver.current_url().unwrap(), "https://example.test/page/1");
        assert_eq!(driver.visits(), ["https://example.test/start"]);
    }

    #[test]
    fn unknown_pages_fail_to_load() {
        let mut driver = pages();
        let err = driver.navigate("https://example.test/missing").unwrap_err();
        assert!(matches!(err, DriverError::Navigation { .. }));
    }

    #[test]
    fn text_filter_and_scoped_lookup() {
        let mut driver = pages();
        driver.navigate("https://example.test/page/1").unwrap();

        let heading = driver.find(&Selector::css_text("h2", "(classic)")).unwrap();
        assert!(heading.is_some());
        assert!(driver.find(&Selector::css_text("h2", "fine-grained")).unwrap().is_none());

        let rows = driver.find_all(&Selector::css("div.Box-row")).unwrap();
        assert_eq!(rows.len(), 2);
        let inner = driver.find_all_within(&rows[0], &Selector::css("div.Box-row")).unwrap();
        assert_eq!(inner.len(), 1);

        let name = driver.find_within(&rows[0], &Selector::css("a > strong")).unwrap().unwrap();
        assert_eq!(driver.text(&name).unwrap(), "deploy");
    }

    #[test]
    fn click_follows_relative_links() {
        let mut driver = pages();
        driver.navigate("https://example.test/page/1").unwrap();
        let next = driver.find(&Selector::css("a.next_page")).unwrap().unwrap();
        driver.click(&next).unwrap();
        assert_eq!(driver.current_url().unwrap(), "https://example.test/page/2");
    }

    #[test]
    fn xpath_is_rejected() {
        let mut driver = pages();
        driver.navigate("https://example.test/page/1").unwrap();
        let err = driver.find(&Selector::XPath("//h2".into())).unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }

    #[test]
    fn loads_a_saved_page_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tokens.html"), PAGE).unwrap();
        fs::write(
            dir.path().join("pages.json"),
            r#"{"https://github.com/settings/tokens": "tokens.html"}"#,
        )
        .unwrap();

        let mut driver = StaticPages::from_dir(dir.path()).unwrap();
        driver.navigate("https://github.com/settings/tokens").unwrap();
        assert!(driver.page_source().unwrap().contains("deploy"));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How an element is located on a page.
///
/// `CssText` is a CSS selector narrowed to elements whose rendered text
/// contains a fragment, which covers "the h2 that says ..." without XPath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    #[serde(rename = "css")]
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
    #[serde(rename = "css_text")]
    CssText { css: String, contains: String },
}

impl Selector {
    pub fn css(css: &str) -> Self {
        Selector::Css(css.to_string())
    }

    pub fn css_text(css: &str, contains: &str) -> Self {
        Selector::CssText {
            css: css.to_string(),
            contains: contains.to_string(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "css `{}`", css),
            Selector::XPath(xpath) => write!(f, "xpath `{}`", xpath),
            Selector::CssText { css, contains } => write!(f, "css `{}` containing '{}'", css, contains),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser failed to launch: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("invalid selector {0}")]
    InvalidSelector(String),

    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    #[error("browser session lost: {0}")]
    Disconnected(String),

    #[error("browser command failed: {0}")]
    Command(String),
}

impl DriverError {
    /// Errors after which the session cannot be used any more.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Launch(_) | DriverError::Disconnected(_))
    }
}

/// The browser capability the scraper drives.
///
/// Implementations own exactly one page; every call is a blocking request
/// against it. Lookups that match nothing return an empty result, never an
/// error.
pub trait Driver {
    type Element: Clone;

    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    fn current_url(&mut self) -> Result<String, DriverError>;

    /// Raw markup of the whole current document.
    fn page_source(&mut self) -> Result<String, DriverError>;

    fn find_all(&mut self, selector: &Selector) -> Result<Vec<Self::Element>, DriverError>;

    /// Descendants of `parent` matching `selector`.
    fn find_all_within(
        &mut self,
        parent: &Self::Element,
        selector: &Selector,
    ) -> Result<Vec<Self::Element>, DriverError>;

    /// Rendered text, whitespace-normalized.
    fn text(&mut self, element: &Self::Element) -> Result<String, DriverError>;

    fn attribute(&mut self, element: &Self::Element, name: &str) -> Result<Option<String>, DriverError>;

    fn outer_html(&mut self, element: &Self::Element) -> Result<String, DriverError>;

    fn click(&mut self, element: &Self::Element) -> Result<(), DriverError>;

    fn find(&mut self, selector: &Selector) -> Result<Option<Self::Element>, DriverError> {
        Ok(self.find_all(selector)?.into_iter().next())
    }

    fn find_within(
        &mut self,
        parent: &Self::Element,
        selector: &Selector,
    ) -> Result<Option<Self::Element>, DriverError> {
        Ok(self.find_all_within(parent, selector)?.into_iter().next())
    }

    /// Ends the session. Further calls may fail.
    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Collapses runs of whitespace the way a browser renders text.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

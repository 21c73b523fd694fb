use chrono::{DateTime, NaiveDate};
use regex::Regex;
use url::Url;

const MARKUP_PREVIEW_CHARS: usize = 100;

/// Turns raw text and attributes scraped off GitHub pages into report fields.
pub struct Extractor {
    no_expiration_regex: Regex,
    expires_on_regex: Regex,
    base_url: Url,
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            no_expiration_regex: Regex::new(r"(?i)\bno expiration\b").unwrap(),
            // "Expires on Wed, Jan 1 2025." / "Expired on Jan 1, 2025"
            expires_on_regex: Regex::new(r"(?i)\bexpire[sd]\s+on\s+(.+?)\.?\s*$").unwrap(),
            base_url: Url::parse("https://github.com/").unwrap(),
        }
    }

    /// Renders a `<relative-time datetime="...">` value as `YYYY-MM-DD`.
    pub fn format_datetime(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string())
    }

    /// Reads expiry text such as "No expiration" or "Expires on Jan 1 2025".
    ///
    /// Dates GitHub prints in its usual formats come back as `YYYY-MM-DD`;
    /// anything else after "Expires on" is kept verbatim. Text without either
    /// phrase yields `None`, even when it holds a date.
    pub fn expiry_from_text(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if self.no_expiration_regex.is_match(text) {
            return Some("No expiration".to_string());
        }
        let date = self.expires_on_regex.captures(text).and_then(|caps| caps.get(1))?;
        Some(parse_display_date(date.as_str().trim()).unwrap_or_else(|| text.to_string()))
    }

    /// A bare display date such as "Jan 1, 2025" as `YYYY-MM-DD`.
    pub fn date_from_text(&self, text: &str) -> Option<String> {
        parse_display_date(text.trim())
    }

    /// Login name from a profile link such as `/octocat` or
    /// `https://github.com/orgs/acme/people/octocat`.
    pub fn identifier_from_href(&self, href: &str) -> Option<String> {
        let url = self.base_url.join(href.trim()).ok()?;
        let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
        let decoded = urlencoding::decode(last).ok()?;
        Some(decoded.into_owned())
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_display_date(date: &str) -> Option<String> {
    let cleaned = date.replace(',', "");
    // "Wed Jan 1 2025" carries a weekday; drop it when present.
    let without_weekday = match cleaned.split_once(' ') {
        Some((first, rest))
            if first.len() == 3
                && first.chars().all(|c| c.is_ascii_alphabetic())
                && rest.split_whitespace().count() == 3 =>
        {
            rest.to_string()
        }
        _ => cleaned,
    };
    ["%b %d %Y", "%B %d %Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(without_weekday.trim(), fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// First characters of a row's markup, for log lines.
pub fn markup_preview(html: &str) -> String {
    html.chars().take(MARKUP_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_attribute_becomes_a_date() {
        let ex = Extractor::new();
        assert_eq!(ex.format_datetime("2025-01-01T12:00:00Z").as_deref(), Some("2025-01-01"));
        assert_eq!(ex.format_datetime("2025-03-04T23:30:00-05:00").as_deref(), Some("2025-03-04"));
        assert_eq!(ex.format_datetime("2025-01-01").as_deref(), Some("2025-01-01"));
        assert_eq!(ex.format_datetime("soon"), None);
    }

    #[test]
    fn expiry_text_variants() {
        let ex = Extractor::new();
        assert_eq!(ex.expiry_from_text("  No expiration date ").as_deref(), Some("No expiration"));
        assert_eq!(ex.expiry_from_text("Expires on Wed, Jan 1 2025.").as_deref(), Some("2025-01-01"));
        assert_eq!(ex.expiry_from_text("Expired on March 3, 2024").as_deref(), Some("2024-03-03"));
        assert_eq!(
            ex.expiry_from_text("Expires on the next full moon").as_deref(),
            Some("Expires on the next full moon")
        );
        assert_eq!(ex.expiry_from_text("Last used within the last week"), None);
    }

    #[test]
    fn bare_dates_are_not_expiry_text() {
        let ex = Extractor::new();
        assert_eq!(ex.expiry_from_text("Jan 1, 2024"), None);
        assert_eq!(ex.date_from_text(" Jan 1, 2024 ").as_deref(), Some("2024-01-01"));
        assert_eq!(ex.date_from_text("Wed, Jan 1 2025").as_deref(), Some("2025-01-01"));
        assert_eq!(ex.date_from_text("yesterday"), None);
    }

    #[test]
    fn identifiers_come_from_the_last_path_segment() {
        let ex = Extractor::new();
        assert_eq!(ex.identifier_from_href("/octocat").as_deref(), Some("octocat"));
        assert_eq!(
            ex.identifier_from_href("https://github.com/orgs/acme/people/hubot/").as_deref(),
            Some("hubot")
        );
        assert_eq!(ex.identifier_from_href("/"), None);
    }

    #[test]
    fn previews_respect_char_boundaries() {
        let long = "é".repeat(150);
        assert_eq!(markup_preview(&long).chars().count(), 100);
    }
}

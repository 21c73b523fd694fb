use log::info;
use std::fs;
use std::path::Path;

use crate::error::ScrapeError;

/// One credential found on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    /// Identifier of the page the row came from.
    pub subject: String,
    pub name: String,
    pub expiration: String,
}

/// Column layout of the CSV report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLayout {
    /// `Username,Token Name,Expiration Date`
    PerUser,
    /// `Token Name,Expiration Date`, for a single account's own tokens.
    SingleAccount,
}

impl ReportLayout {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            ReportLayout::PerUser => &["Username", "Token Name", "Expiration Date"],
            ReportLayout::SingleAccount => &["Token Name", "Expiration Date"],
        }
    }
}

/// Writes `rows` to `path`, replacing any existing file.
///
/// The header is always written, so an empty result is a valid report.
pub fn write_report(rows: &[ExtractedRow], layout: ReportLayout, path: &Path) -> Result<(), ScrapeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ScrapeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let report_err = |source: csv::Error| ScrapeError::Report {
        path: path.to_path_buf(),
        source,
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(report_err)?;
    csv_writer.write_record(layout.header()).map_err(report_err)?;

    for row in rows {
        let written = match layout {
            ReportLayout::PerUser => csv_writer.write_record([&row.subject, &row.name, &row.expiration]),
            ReportLayout::SingleAccount => csv_writer.write_record([&row.name, &row.expiration]),
        };
        written.map_err(report_err)?;
    }
    csv_writer.flush().map_err(|e| report_err(e.into()))?;

    if rows.is_empty() {
        info!("No tokens were scraped. Wrote headers only to {:?}", path);
    } else {
        info!("Data successfully saved to {:?} ({} rows).", path, rows.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(subject: &str, name: &str, expiration: &str) -> ExtractedRow {
        ExtractedRow {
            subject: subject.into(),
            name: name.into(),
            expiration: expiration.into(),
        }
    }

    #[test]
    fn empty_result_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.csv");
        write_report(&[], ReportLayout::PerUser, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Username,Token Name,Expiration Date\n");
    }

    #[test]
    fn single_account_layout_drops_the_subject() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pats.csv");
        let rows = [row("self", "ci, nightly", "No expiration")];
        write_report(&rows, ReportLayout::SingleAccount, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Token Name,Expiration Date\n\"ci, nightly\",No expiration\n"
        );
    }

    #[test]
    fn existing_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(&path, "stale,data\nmore,stale\nlines,here\n").unwrap();

        write_report(&[row("alice", "token-A", "2025-01-01")], ReportLayout::PerUser, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Username,Token Name,Expiration Date\nalice,token-A,2025-01-01\n"
        );
    }
}

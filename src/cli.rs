use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ScraperConfig, Variant};
use crate::error::ScrapeError;

#[derive(Parser, Debug)]
#[command(name = "gh_token_scraper")]
#[command(about = "Audit GitHub SSO credentials and classic personal access tokens from a logged-in browser.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON file overriding URLs, selectors and timings
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// CSV report path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Where page markup is saved when a page cannot be scraped
    #[arg(long, global = true, value_name = "DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Seconds to wait for a manual login
    #[arg(long, global = true, value_name = "SECS")]
    pub auth_timeout: Option<u64>,

    /// Chrome profile directory to reuse (keeps an existing login)
    #[arg(long, global = true, value_name = "DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Scrape saved pages listed in DIR/pages.json instead of a live browser
    #[arg(long, global = true, value_name = "DIR")]
    pub replay: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// SSO-authorized credentials of every member of an organization
    Org { org: String },
    /// Your own classic personal access tokens
    Pats,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn variant(&self) -> Variant {
        match &self.command {
            Commands::Org { org } => Variant::Org { org: org.clone() },
            Commands::Pats => Variant::Pats,
        }
    }

    /// The config file with command-line overrides applied.
    ///
    /// A file that fails to load is handed back beside defaults (still with
    /// the overrides) so logging can start before the error is reported.
    pub fn load_config(&self) -> (ScraperConfig, Option<ScrapeError>) {
        let (mut config, error) = match ScraperConfig::load(self.config.as_deref()) {
            Ok(config) => (config, None),
            Err(e) => (ScraperConfig::default(), Some(e)),
        };
        self.apply(&mut config);
        (config, error)
    }

    /// Lets command-line flags win over the config file.
    pub fn apply(&self, config: &mut ScraperConfig) {
        if let Some(path) = &self.output {
            config.output.report = Some(path.clone());
        }
        if let Some(path) = &self.log_file {
            config.output.log_file = path.clone();
        }
        if let Some(dir) = &self.debug_dir {
            config.output.debug_dir = dir.clone();
        }
        if let Some(secs) = self.auth_timeout {
            config.timing.auth_timeout_secs = secs;
        }
        if let Some(dir) = &self.profile_dir {
            config.browser.user_data_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_subcommand_with_overrides() {
        let cli = CommandLine::parse_from([
            "gh_token_scraper",
            "org",
            "acme",
            "--auth-timeout",
            "60",
            "-o",
            "out/acme.csv",
        ]);
        assert_eq!(cli.variant(), Variant::Org { org: "acme".into() });

        let mut config = ScraperConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.timing.auth_timeout_secs, 60);
        assert_eq!(config.output.report, Some(PathBuf::from("out/acme.csv")));
        assert_eq!(config.output.log_file, PathBuf::from("logs/scraper.log"));
    }

    #[test]
    fn pats_takes_no_argument() {
        let cli = CommandLine::parse_from(["gh_token_scraper", "--verbose", "pats"]);
        assert_eq!(cli.variant(), Variant::Pats);
        assert!(cli.verbose);
        assert!(CommandLine::try_parse_from(["gh_token_scraper", "pats", "extra"]).is_err());
    }

    #[test]
    fn broken_config_file_still_yields_the_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();
        let log_path = dir.path().join("run.log");
        let config_arg = config_path.to_string_lossy().into_owned();
        let log_arg = log_path.to_string_lossy().into_owned();

        let cli = CommandLine::parse_from([
            "gh_token_scraper",
            "--config",
            config_arg.as_str(),
            "--log-file",
            log_arg.as_str(),
            "pats",
        ]);
        let (config, error) = cli.load_config();

        assert!(matches!(error, Some(ScrapeError::Config(_))));
        assert_eq!(config.output.log_file, log_path);
    }

    #[test]
    fn a_subcommand_is_required() {
        assert!(CommandLine::try_parse_from(["gh_token_scraper"]).is_err());
    }
}

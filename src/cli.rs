//! Command-line interface parsing for gatherdata
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a `RunConfig` with every path resolved against the data directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use thiserror::Error;

use crate::data::CITI_BIKE_STATUS_URL;

/// File name of the iris dataset inside the data directory
const IRIS_FILE: &str = "iris.csv";

/// File name of the saved station status snapshot
const SNAPSHOT_FILE: &str = "citibike.json";

/// File name of the key-value store
const STORE_FILE: &str = "tutorial.db";

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The feed URL is not an http(s) URL
    #[error("Invalid feed URL: '{0}'. Expected an http:// or https:// URL")]
    InvalidFeedUrl(String),
}

/// gatherdata - Read iris CSV data, fetch bike-share station status and exercise caches
#[derive(Parser, Debug)]
#[command(name = "gatherdata")]
#[command(about = "Gather CSV and JSON data and exercise in-memory and on-disk caches")]
#[command(version)]
pub struct Cli {
    /// Directory holding the input CSV, the JSON snapshot and the store file
    #[arg(long, global = true, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Iris CSV file (defaults to <DATA_DIR>/iris.csv)
    #[arg(long, global = true, value_name = "FILE")]
    pub iris: Option<PathBuf>,

    /// Station status feed URL
    #[arg(long, global = true, value_name = "URL", default_value = CITI_BIKE_STATUS_URL)]
    pub feed_url: String,

    /// Use the saved station snapshot instead of fetching the feed
    #[arg(long, global = true)]
    pub offline: bool,

    /// Increase log output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Routine to run; runs all of them when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// The available routines
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run every routine in order
    All,
    /// Print every CSV row as raw strings
    CsvRaw,
    /// Print validated iris records, skipping malformed rows
    CsvRecords,
    /// Print the CSV as a typed table
    CsvTable,
    /// Fetch station status and save it to the data directory
    Stations,
    /// Exercise the in-memory expiring cache
    MemoryCache,
    /// Exercise the on-disk key-value store
    DiskStore,
}

impl Command {
    /// Routines started by this command, in run order
    pub fn routines(self) -> Vec<Command> {
        match self {
            Command::All => vec![
                Command::Stations,
                Command::CsvTable,
                Command::CsvRecords,
                Command::MemoryCache,
                Command::DiskStore,
            ],
            single => vec![single],
        }
    }
}

/// Settings derived from CLI arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub iris_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub store_path: PathBuf,
    pub feed_url: String,
    pub offline: bool,
    pub command: Command,
    pub log_level: LevelFilter,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::for_data_dir(PathBuf::from("data"))
    }
}

impl RunConfig {
    /// Default configuration with every file placed in `data_dir`
    pub fn for_data_dir(data_dir: PathBuf) -> Self {
        Self {
            iris_path: data_dir.join(IRIS_FILE),
            snapshot_path: data_dir.join(SNAPSHOT_FILE),
            store_path: data_dir.join(STORE_FILE),
            data_dir,
            feed_url: CITI_BIKE_STATUS_URL.to_string(),
            offline: false,
            command: Command::All,
            log_level: LevelFilter::Warn,
        }
    }

    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with every path resolved
    /// * `Err(CliError)` if the feed URL is not an http(s) URL
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let url = cli.feed_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CliError::InvalidFeedUrl(cli.feed_url.clone()));
        }

        let mut config = Self::for_data_dir(cli.data_dir.clone());
        if let Some(iris) = &cli.iris {
            config.iris_path = iris.clone();
        }
        config.feed_url = url.to_string();
        config.offline = cli.offline;
        config.command = cli.command.unwrap_or(Command::All);
        config.log_level = match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["gatherdata"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.data_dir, PathBuf::from("data"));
        assert_eq!(cli.feed_url, CITI_BIKE_STATUS_URL);
        assert!(!cli.offline);
    }

    #[test]
    fn test_cli_parse_subcommand() {
        let cli = Cli::parse_from(["gatherdata", "csv-records"]);
        assert_eq!(cli.command, Some(Command::CsvRecords));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["gatherdata", "stations", "--offline", "--data-dir", "/tmp/x"]);
        assert_eq!(cli.command, Some(Command::Stations));
        assert!(cli.offline);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_cli_verbose_counts() {
        let cli = Cli::parse_from(["gatherdata", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_run_config_defaults_from_data_dir() {
        let cli = Cli::parse_from(["gatherdata", "--data-dir", "/srv/data"]);
        let config = RunConfig::from_cli(&cli).unwrap();

        assert_eq!(config.iris_path, Path::new("/srv/data/iris.csv"));
        assert_eq!(config.snapshot_path, Path::new("/srv/data/citibike.json"));
        assert_eq!(config.store_path, Path::new("/srv/data/tutorial.db"));
        assert_eq!(config.command, Command::All);
        assert_eq!(config.log_level, LevelFilter::Warn);
    }

    #[test]
    fn test_run_config_iris_override() {
        let cli = Cli::parse_from(["gatherdata", "--iris", "/tmp/flowers.csv", "-v"]);
        let config = RunConfig::from_cli(&cli).unwrap();

        assert_eq!(config.iris_path, Path::new("/tmp/flowers.csv"));
        assert_eq!(config.snapshot_path, Path::new("data/citibike.json"));
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn test_run_config_rejects_non_http_url() {
        let cli = Cli::parse_from(["gatherdata", "--feed-url", "ftp://example.com/feed.json"]);
        let result = RunConfig::from_cli(&cli);

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid feed URL"));
    }

    #[test]
    fn test_all_runs_routines_in_order() {
        assert_eq!(
            Command::All.routines(),
            vec![
                Command::Stations,
                Command::CsvTable,
                Command::CsvRecords,
                Command::MemoryCache,
                Command::DiskStore,
            ]
        );
        assert_eq!(Command::CsvRaw.routines(), vec![Command::CsvRaw]);
    }
}

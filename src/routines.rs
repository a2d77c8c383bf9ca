//! The data-gathering routines
//!
//! Each routine reads or fetches one kind of data and prints the result to
//! the given writer. Routines share nothing; the caller decides how to react
//! to a failure.

use std::io::Write;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use log::info;
use thiserror::Error;

use crate::cache::{Expiration, MemoryCache, Store, StoreError};
use crate::cli::{Command, RunConfig};
use crate::data::{self, StationError, StationFeedClient, TableError};

/// Lifetime of items set with the default expiration
const DEFAULT_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// Name of the bucket used by the store routine
pub const DEMO_BUCKET: &str = "MyBucket";

/// Key/value pair written by the cache routines
pub const DEMO_KEY: &str = "tut-key";
pub const DEMO_VALUE: &str = "go tutorial";

/// Rows printed by the table routine
const TABLE_PREVIEW_ROWS: usize = 10;

/// Errors produced by a routine
#[derive(Debug, Error)]
pub enum RoutineError {
    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Table read failed: {0}")]
    Table(#[from] TableError),

    #[error("Station status failed: {0}")]
    Station(#[from] StationError),

    #[error("Store failed: {0}")]
    Store(#[from] StoreError),

    /// Writing the output failed
    #[error("Output failed: {0}")]
    Output(#[from] std::io::Error),
}

/// Runs a routine. `Command::All` runs every routine in order and stops at
/// the first failure; the binary expands it itself to apply its error policy.
pub async fn run_routine<W: Write>(
    routine: Command,
    config: &RunConfig,
    out: &mut W,
) -> Result<(), RoutineError> {
    for step in routine.routines() {
        info!("running {:?}", step);
        match step {
            Command::CsvRaw => csv_read_all(config, out)?,
            Command::CsvRecords => csv_read_records(config, out)?,
            Command::CsvTable => csv_table(config, out)?,
            Command::Stations => station_status(config, out).await?,
            Command::MemoryCache => memory_cache(out)?,
            Command::DiskStore => disk_store(config, out)?,
            // routines() never yields All
            Command::All => {}
        }
    }
    Ok(())
}

/// Prints every row of the iris file as raw strings
pub fn csv_read_all<W: Write>(config: &RunConfig, out: &mut W) -> Result<(), RoutineError> {
    let rows = data::read_all_from_path(&config.iris_path)?;
    for row in &rows {
        writeln!(out, "{:?}", row.iter().collect::<Vec<_>>())?;
    }
    Ok(())
}

/// Prints the valid iris records and how many rows were skipped
pub fn csv_read_records<W: Write>(config: &RunConfig, out: &mut W) -> Result<(), RoutineError> {
    let report = data::read_records_from_path(&config.iris_path)?;
    for record in &report.records {
        writeln!(out, "{:?}", record)?;
    }
    writeln!(
        out,
        "kept {} records, skipped {} rows",
        report.records.len(),
        report.rejected.len()
    )?;
    Ok(())
}

/// Prints the head of the iris file as a typed table
pub fn csv_table<W: Write>(config: &RunConfig, out: &mut W) -> Result<(), RoutineError> {
    let table = data::Table::from_path(&config.iris_path)?;
    writeln!(
        out,
        "[{}x{}] Table, showing first {} rows",
        table.num_rows(),
        table.num_columns(),
        TABLE_PREVIEW_ROWS.min(table.num_rows())
    )?;
    writeln!(out, "{}", table.head(TABLE_PREVIEW_ROWS))?;
    Ok(())
}

/// Fetches station status (or loads the snapshot when offline) and prints the first station
pub async fn station_status<W: Write>(
    config: &RunConfig,
    out: &mut W,
) -> Result<(), RoutineError> {
    let status = if config.offline {
        data::load_snapshot(&config.snapshot_path)?
    } else {
        StationFeedClient::new(config.feed_url.as_str())
            .fetch_and_persist(&config.snapshot_path)
            .await?
    };

    match status.first_station() {
        Some(station) => writeln!(out, "{:?}", station)?,
        None => writeln!(out, "feed contains no stations")?,
    }

    let updated = Utc
        .timestamp_opt(status.last_updated, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| status.last_updated.to_string());
    writeln!(
        out,
        "{} stations, last updated {} ({}), snapshot {}",
        status.station_count(),
        updated,
        if status.is_fresh(Utc::now()) {
            "fresh"
        } else {
            "expired"
        },
        config.snapshot_path.display()
    )?;
    Ok(())
}

/// Stores and reads back a value in an expiring in-memory cache
pub fn memory_cache<W: Write>(out: &mut W) -> Result<(), RoutineError> {
    let cache: MemoryCache<String> = MemoryCache::new(Some(DEFAULT_EXPIRATION));

    cache.set(DEMO_KEY, DEMO_VALUE.to_string(), Expiration::Default);
    if let Some(value) = cache.get(DEMO_KEY) {
        writeln!(out, "key: {}, value: {}", DEMO_KEY, value)?;
    }
    Ok(())
}

/// Opens the on-disk store, ensures the demo bucket and prints its contents
pub fn disk_store<W: Write>(config: &RunConfig, out: &mut W) -> Result<(), RoutineError> {
    let mut store = Store::open(&config.store_path)?;

    store.update(|tx| {
        let bucket = tx.create_bucket_if_not_exists(DEMO_BUCKET)?;
        bucket.put(DEMO_KEY.as_bytes(), DEMO_VALUE.as_bytes())
    })?;

    let entries = store.view(|tx| match tx.bucket(DEMO_BUCKET)? {
        Some(bucket) => bucket.entries(),
        None => Err(StoreError::BucketNotFound(DEMO_BUCKET.to_string())),
    })?;

    for (key, value) in &entries {
        writeln!(
            out,
            "key: {}, value: {}",
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(value)
        )?;
    }
    Ok(())
}

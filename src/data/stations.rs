//! Bike-share station status feed client
//!
//! Fetches a GBFS `station_status.json` document, decodes it into typed
//! stations and persists the re-serialized document to a local snapshot file.
//! When the feed cannot be reached the last snapshot is used instead.

use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Citi Bike NYC station status feed
pub const CITI_BIKE_STATUS_URL: &str = "https://gbfs.citibikenyc.com/gbfs/en/station_status.json";

/// Errors that can occur when fetching or persisting station status
#[derive(Debug, Error)]
pub enum StationError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Feed answered with a non-success status
    #[error("Feed returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Failed to decode or encode the JSON document
    #[error("Failed to parse station status: {0}")]
    Parse(#[from] serde_json::Error),

    /// Reading or writing the snapshot failed
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Offline mode was requested but nothing has been saved yet
    #[error("No saved snapshot at {0}")]
    NoSnapshot(String),
}

/// Status of a single docking station
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Station {
    #[serde(default)]
    pub station_id: String,
    #[serde(default)]
    pub num_bikes_available: i64,
    #[serde(default, alias = "num_bike_disabled")]
    pub num_bikes_disabled: i64,
    #[serde(default)]
    pub num_docks_available: i64,
    #[serde(default)]
    pub num_docks_disabled: i64,
    #[serde(default, deserialize_with = "flag")]
    pub is_installed: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_renting: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_returning: bool,
    /// Unix timestamp of the station's last report
    #[serde(default)]
    pub last_reported: i64,
    #[serde(default)]
    pub eightd_has_available_keys: bool,
}

/// Payload wrapper of the feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationData {
    #[serde(default)]
    pub stations: Vec<Station>,
}

/// A decoded station status document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationStatus {
    /// Unix timestamp of the last feed update
    #[serde(default)]
    pub last_updated: i64,
    /// Seconds the document stays valid after `last_updated`
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub data: StationData,
}

/// GBFS publishes the status flags as either `0/1` or booleans
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(value) => value,
        RawFlag::Int(value) => value != 0,
    })
}

impl StationStatus {
    /// First station of the feed, if the feed has any
    pub fn first_station(&self) -> Option<&Station> {
        self.data.stations.first()
    }

    pub fn station_count(&self) -> usize {
        self.data.stations.len()
    }

    /// When the document stops being valid
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.last_updated.saturating_add(self.ttl), 0)
            .single()
    }

    /// Whether the document is still within its TTL at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires| now <= expires)
    }
}

/// Writes the re-serialized document to `path`, creating parent directories
pub fn save_snapshot(status: &StationStatus, path: &Path) -> Result<(), StationError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec(status)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads a snapshot previously written by `save_snapshot`
pub fn load_snapshot(path: &Path) -> Result<StationStatus, StationError> {
    if !path.exists() {
        return Err(StationError::NoSnapshot(path.display().to_string()));
    }
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// Client for a GBFS station status feed
#[derive(Debug, Clone)]
pub struct StationFeedClient {
    http_client: Client,
    url: String,
}

impl Default for StationFeedClient {
    fn default() -> Self {
        Self::new(CITI_BIKE_STATUS_URL)
    }
}

impl StationFeedClient {
    /// Creates a client for the feed at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Creates a client with a custom HTTP client
    pub fn with_client(http_client: Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs a single GET against the feed and decodes the document
    pub async fn fetch_status(&self) -> Result<StationStatus, StationError> {
        let response = self.http_client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(StationError::Status(response.status()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetches the feed and saves it to `snapshot_path`.
    ///
    /// # Behavior
    /// - On success the snapshot is overwritten and the fresh document returned
    /// - On fetch failure the existing snapshot is returned, even if expired
    /// - With no snapshot to fall back on, the fetch error is returned
    pub async fn fetch_and_persist(
        &self,
        snapshot_path: &Path,
    ) -> Result<StationStatus, StationError> {
        match self.fetch_status().await {
            Ok(status) => {
                save_snapshot(&status, snapshot_path)?;
                info!(
                    "saved {} stations to {}",
                    status.station_count(),
                    snapshot_path.display()
                );
                Ok(status)
            }
            Err(fetch_error) => match load_snapshot(snapshot_path) {
                Ok(status) => {
                    let state = if status.is_fresh(Utc::now()) {
                        "fresh"
                    } else {
                        "expired"
                    };
                    warn!(
                        "fetching {} failed ({}), using {} snapshot {}",
                        self.url,
                        fetch_error,
                        state,
                        snapshot_path.display()
                    );
                    Ok(status)
                }
                Err(_) => Err(fetch_error),
            },
        }
    }
}

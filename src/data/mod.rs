//! Data sources for gatherdata
//!
//! This module contains the readers for the iris CSV dataset (raw rows,
//! validated records and typed tables) and the client for the bike-share
//! station status feed.

pub mod iris;
pub mod stations;
pub mod table;

pub use iris::{
    parse_record, read_all, read_all_from_path, read_records, read_records_from_path,
    IrisRecord, IrisReport, RecordError, RejectedRow,
};
pub use stations::{
    load_snapshot, save_snapshot, Station, StationError, StationFeedClient, StationStatus,
    CITI_BIKE_STATUS_URL,
};
pub use table::{Table, TableError};

// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::path::PathBuf;

use core_types::AssetId;
use thiserror::Error;
use time::Date;

pub type Result<T> = std::result::Result<T, ReadError>;

/// Problems with a per-asset input table itself.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("table has no day column")]
    MissingDayColumn,
    #[error("column {column} has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },
    #[error("day column is not strictly increasing at row {row}")]
    UnsortedDays { row: usize },
    #[error("day column holds null or out-of-range date at row {row}")]
    InvalidDay { row: usize },
    #[error("column name {column:?} is reserved")]
    ReservedColumn { column: String },
}

/// Container-level failures shared by writer and reader.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("column store file missing magic header")]
    BadMagic,
    #[error("unsupported column store format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("column store file truncated: {detail}")]
    Truncated { detail: String },
    #[error("attribute block checksum mismatch")]
    AttributeChecksum,
    #[error("chunk {chunk} of column {column} failed checksum")]
    ChunkChecksum { column: String, chunk: usize },
    #[error("chunk {chunk} of column {column} failed to decompress: {reason}")]
    Decompress {
        column: String,
        chunk: usize,
        reason: String,
    },
    #[error("attribute block error: {0}")]
    Attributes(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown asset id {asset}")]
    UnknownAsset { asset: AssetId },
    #[error("asset id {asset} supplied more than once")]
    DuplicateAsset { asset: AssetId },
    #[error("asset {asset} supplied an empty table")]
    EmptyTable { asset: AssetId },
    #[error("asset {asset} table has no column {column}")]
    MissingColumn { asset: AssetId, column: String },
    #[error(
        "asset {asset}: got {actual} rows for daily table with first day={first_day}, last day={last_day}, expected {expected} rows; missing sessions: {missing:?}; extra sessions: {extra:?}"
    )]
    SchemaMismatch {
        asset: AssetId,
        first_day: Date,
        last_day: Date,
        expected: usize,
        actual: usize,
        missing: Vec<Date>,
        extra: Vec<Date>,
    },
    #[error("asset {asset}: {count} values out of bounds for column {column} at rows {rows:?}")]
    OutOfRangeValue {
        asset: AssetId,
        column: String,
        count: usize,
        rows: Vec<usize>,
    },
    #[error("value {value} from column {column} is too large")]
    DateOverflow { column: String, value: i64 },
    #[error("session {date} is not part of calendar {calendar}")]
    SessionNotInCalendar { date: Date, calendar: String },
    #[error("destination {path} already exists")]
    DestinationExists { path: PathBuf },
    #[error("invalid writer options: {reason}")]
    InvalidOptions { reason: String },
    #[error("table error for asset {asset}: {source}")]
    Table {
        asset: AssetId,
        #[source]
        source: TableError,
    },
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("asset {asset} is not present in the store index")]
    AssetNotFound { asset: AssetId },
    #[error("no data for asset {asset} on {date}: before its first session {first}")]
    NoDataBeforeDate {
        asset: AssetId,
        date: Date,
        first: Date,
    },
    #[error("no data for asset {asset} on {date}: after its last session {last}")]
    NoDataAfterDate {
        asset: AssetId,
        date: Date,
        last: Date,
    },
    #[error("{date} is not a session covered by this store")]
    NotASession { date: Date },
    #[error("start {start} is after end {end}")]
    InvalidRange { start: Date, end: Date },
    #[error("unknown column {column}")]
    UnknownColumn { column: String },
    #[error("corrupt index: {reason}")]
    CorruptIndex { reason: String },
    #[error("store was written against calendar {stored}, reader supplied {supplied}")]
    CalendarMismatch { stored: String, supplied: String },
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

impl From<std::io::Error> for ReadError {
    fn from(value: std::io::Error) -> Self {
        FormatError::from(value).into()
    }
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("no ingestions for bundle {bundle} on or before {as_of}")]
    NoIngestions { bundle: String, as_of: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

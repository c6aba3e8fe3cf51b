// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Per-asset daily time-series column store.
//!
//! Each asset's daily rows are appended back to back into one shared row space, so a single
//! store file holds every asset's history as a handful of chunked, compressed columns.
//!
//! The crate exposes:
//! - [`StoreWriter`]: validates per-asset [`AssetTable`]s against the session calendar, applies
//!   the invalid-data policy, and seals the store atomically.
//! - [`StoreReader`]: point lookups ([`StoreReader::get_value`]) and bulk `(session × asset)`
//!   loads ([`StoreReader::load`]) over a memory-mapped store.
//! - [`ValueCodec`]: the fixed-point / raw-float word encoding shared by both sides.
//! - [`BundleLayout`]: versioned ingestion directories for a named bundle.

mod attributes;
pub mod bundle;
pub mod codec;
mod column;
pub mod error;
pub mod format;
pub mod gather;
pub mod reader;
mod storage;
pub mod table;
pub mod writer;

pub use attributes::{AssetSpan, StoreAttributes};
pub use bundle::{BundleLayout, DAILY_STORE_FILE};
pub use codec::{ValueCodec, ValueRangeError};
pub use column::ColumnKind;
pub use error::{BundleError, FormatError, IngestError, ReadError, Result, TableError};
pub use gather::{GatherStrategy, Matrix, RowSlice};
pub use reader::StoreReader;
pub use table::{AssetTable, DAY_COLUMN, ID_COLUMN};
pub use writer::{ClipDiagnostic, IngestReport, StoreWriter, WriterOptions};

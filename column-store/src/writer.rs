// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use core_types::{config::validate_fields, AssetId, BundleConfig, Encoding, InvalidDataBehavior};
use log::{debug, info};
use session_calendar::{session_timestamp, SessionCalendar, SessionRange};
use time::{Date, OffsetDateTime};

use crate::{
    attributes::{AssetSpan, ColumnLayout, StoreAttributes},
    codec::ValueCodec,
    error::IngestError,
    format::{encode_chunk, FORMAT_VERSION},
    storage::StagedStore,
    table::{AssetTable, DAY_COLUMN, ID_COLUMN},
};

#[derive(Clone, Debug, PartialEq)]
pub struct WriterOptions {
    pub fields: Vec<String>,
    pub encoding: Encoding,
    pub invalid_data_behavior: InvalidDataBehavior,
    pub chunk_rows: u32,
}

impl WriterOptions {
    pub fn new(fields: Vec<String>, encoding: Encoding) -> Self {
        Self {
            fields,
            encoding,
            invalid_data_behavior: InvalidDataBehavior::default(),
            chunk_rows: core_types::config::DEFAULT_CHUNK_ROWS,
        }
    }

    pub fn with_invalid_data_behavior(mut self, behavior: InvalidDataBehavior) -> Self {
        self.invalid_data_behavior = behavior;
        self
    }

    pub fn with_chunk_rows(mut self, chunk_rows: u32) -> Self {
        self.chunk_rows = chunk_rows;
        self
    }

    pub fn from_config(config: &BundleConfig) -> Self {
        Self {
            fields: config.fields.clone(),
            encoding: config.encoding,
            invalid_data_behavior: config.invalid_data_behavior,
            chunk_rows: config.chunk_rows,
        }
    }

    fn validate(&self) -> Result<(), IngestError> {
        validate_fields(&self.fields).map_err(|e| IngestError::InvalidOptions {
            reason: e.to_string(),
        })?;
        if self.chunk_rows == 0 {
            return Err(IngestError::InvalidOptions {
                reason: "chunk_rows must be positive".into(),
            });
        }
        match self.encoding {
            Encoding::ScaledFixedPoint { scale: 0 } => Err(IngestError::InvalidOptions {
                reason: "scale factor must be positive".into(),
            }),
            Encoding::RawFloat { sentinel } if sentinel.is_nan() => Err(IngestError::InvalidOptions {
                reason: "missing sentinel must not be NaN".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// A column winsorised under [`InvalidDataBehavior::Warn`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipDiagnostic {
    pub asset: AssetId,
    pub column: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IngestReport {
    pub path: PathBuf,
    pub assets: usize,
    pub total_rows: u64,
    pub first_trading_day: Option<Date>,
    pub diagnostics: Vec<ClipDiagnostic>,
}

impl IngestReport {
    pub fn clipped_values(&self) -> usize {
        self.diagnostics.iter().map(|d| d.count).sum()
    }
}

/// Builds one store from a single pass over per-asset tables.
///
/// `write` consumes the writer; a store is written exactly once and either lands complete at
/// the destination or not at all.
pub struct StoreWriter<'a, C: SessionCalendar + ?Sized> {
    destination: PathBuf,
    calendar: &'a C,
    sessions: SessionRange,
    codec: ValueCodec,
    options: WriterOptions,
}

impl<'a, C: SessionCalendar + ?Sized> StoreWriter<'a, C> {
    pub fn new(
        destination: impl Into<PathBuf>,
        calendar: &'a C,
        start_session: Date,
        end_session: Date,
        options: WriterOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;
        for date in [start_session, end_session] {
            if !calendar.is_session(date) {
                return Err(IngestError::SessionNotInCalendar {
                    date,
                    calendar: calendar.name().to_string(),
                });
            }
        }
        if start_session > end_session {
            return Err(IngestError::InvalidOptions {
                reason: format!("start session {start_session} is after end session {end_session}"),
            });
        }
        Ok(Self {
            destination: destination.into(),
            calendar,
            sessions: SessionRange::from_calendar(calendar, start_session, end_session),
            codec: options.encoding.into(),
            options,
        })
    }

    pub fn from_config(
        config: &BundleConfig,
        destination: impl Into<PathBuf>,
        calendar: &'a C,
        start_session: Date,
        end_session: Date,
    ) -> Result<Self, IngestError> {
        if config.calendar_name != calendar.name() {
            return Err(IngestError::InvalidOptions {
                reason: format!(
                    "bundle {} expects calendar {}, got {}",
                    config.name,
                    config.calendar_name,
                    calendar.name()
                ),
            });
        }
        Self::new(
            destination,
            calendar,
            start_session,
            end_session,
            WriterOptions::from_config(config),
        )
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn codec(&self) -> ValueCodec {
        self.codec
    }

    /// Writes every `(asset, table)` pair in iteration order and seals the store.
    ///
    /// When `expected_assets` is given, any asset outside it aborts the write. On any error the
    /// partially written staging file is removed and the destination is left untouched.
    pub fn write<I>(
        self,
        data: I,
        expected_assets: Option<&HashSet<AssetId>>,
    ) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = (AssetId, AssetTable)>,
    {
        let mut staged = StagedStore::create(&self.destination)?;
        let chunk_rows = self.options.chunk_rows;
        let mut columns: Vec<ColumnSink> = self
            .options
            .fields
            .iter()
            .map(String::as_str)
            .chain([DAY_COLUMN, ID_COLUMN])
            .map(|name| ColumnSink::new(name, chunk_rows as usize))
            .collect();

        let mut spans: BTreeMap<AssetId, AssetSpan> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut total_rows = 0u64;
        let mut first_trading_day: Option<Date> = None;
        let mut diagnostics = Vec::new();

        for (asset, table) in data {
            if let Some(expected) = expected_assets {
                if !expected.contains(&asset) {
                    return Err(IngestError::UnknownAsset { asset });
                }
            }
            if !seen.insert(asset) {
                return Err(IngestError::DuplicateAsset { asset });
            }
            let prepared = self.prepare(asset, &table)?;
            for (sink, words) in columns.iter_mut().zip(prepared.words) {
                sink.extend(&words, &mut staged)?;
            }
            let rows = table.len() as u64;
            let span = AssetSpan {
                first_row: total_rows,
                last_row: total_rows + rows - 1,
                calendar_offset: prepared.calendar_offset,
            };
            total_rows += rows;
            spans.insert(asset, span);
            diagnostics.extend(prepared.diagnostics);
            if first_trading_day.map_or(true, |day| prepared.first_day < day) {
                first_trading_day = Some(prepared.first_day);
            }
            debug!(
                "wrote asset {} rows {}..={} at session offset {}",
                asset, span.first_row, span.last_row, span.calendar_offset
            );
        }

        let mut layouts = Vec::with_capacity(columns.len());
        for sink in columns {
            layouts.push(sink.finish(&mut staged)?);
        }

        let created_at = OffsetDateTime::now_utc();
        let mut attrs = StoreAttributes {
            format_version: FORMAT_VERSION,
            encoding: self.codec.encoding(),
            fields: self.options.fields.clone(),
            chunk_rows,
            total_rows,
            first_trading_day: first_trading_day.map(session_timestamp),
            first_row: BTreeMap::new(),
            last_row: BTreeMap::new(),
            calendar_offset: BTreeMap::new(),
            calendar_name: self.calendar.name().to_string(),
            start_session: self.sessions.first().map(session_timestamp).unwrap_or_default(),
            end_session: self.sessions.last().map(session_timestamp).unwrap_or_default(),
            created_at_s: created_at.unix_timestamp(),
            columns: layouts,
        };
        for (asset, span) in &spans {
            attrs.record_span(*asset, *span);
        }
        let encoded = serde_json::to_vec(&attrs).map_err(crate::error::FormatError::from)?;
        let path = staged.seal(&encoded, created_at)?;
        info!(
            "sealed column store {:?}: {} assets, {} rows, {}",
            path,
            spans.len(),
            total_rows,
            self.codec.encoding()
        );
        Ok(IngestReport {
            path,
            assets: spans.len(),
            total_rows,
            first_trading_day,
            diagnostics,
        })
    }

    fn prepare(&self, asset: AssetId, table: &AssetTable) -> Result<PreparedAsset, IngestError> {
        let (first_day, last_day) = match (table.first_day(), table.last_day()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(IngestError::EmptyTable { asset }),
        };
        let expected = self.sessions.slice(first_day, last_day);
        if expected != table.days() {
            let days = table.days();
            return Err(IngestError::SchemaMismatch {
                asset,
                first_day,
                last_day,
                expected: expected.len(),
                actual: days.len(),
                missing: expected
                    .iter()
                    .filter(|d| days.binary_search(d).is_err())
                    .copied()
                    .collect(),
                extra: days
                    .iter()
                    .filter(|d| expected.binary_search(d).is_err())
                    .copied()
                    .collect(),
            });
        }
        let calendar_offset =
            self.sessions
                .index_of(first_day)
                .ok_or_else(|| IngestError::SessionNotInCalendar {
                    date: first_day,
                    calendar: self.calendar.name().to_string(),
                })?;

        let behavior = self.options.invalid_data_behavior;
        let mut words = Vec::with_capacity(self.options.fields.len() + 2);
        let mut diagnostics = Vec::new();
        for field in &self.options.fields {
            let values = table
                .column(field)
                .ok_or_else(|| IngestError::MissingColumn {
                    asset,
                    column: field.clone(),
                })?;
            let winsorised = self
                .codec
                .apply_policy(field, values, behavior)
                .map_err(|e| IngestError::OutOfRangeValue {
                    asset,
                    column: e.column,
                    count: e.count,
                    rows: e.rows,
                })?;
            if behavior == InvalidDataBehavior::Warn && !winsorised.coerced.is_empty() {
                diagnostics.push(ClipDiagnostic {
                    asset,
                    column: field.clone(),
                    count: winsorised.coerced.len(),
                });
            }
            words.push(
                winsorised
                    .values
                    .iter()
                    .map(|v| self.codec.encode(*v))
                    .collect::<Vec<_>>(),
            );
        }

        let seconds: Vec<i64> = table.days().iter().map(|d| session_timestamp(*d)).collect();
        if let Some(max) = seconds.iter().map(|s| s.abs()).max() {
            self.codec.check_bound(max, DAY_COLUMN)?;
        }
        words.push(seconds.iter().map(|s| self.codec.encode_plain(*s)).collect());
        words.push(vec![self.codec.encode_plain(asset as i64); table.len()]);

        Ok(PreparedAsset {
            first_day,
            calendar_offset,
            words,
            diagnostics,
        })
    }
}

struct PreparedAsset {
    first_day: Date,
    calendar_offset: usize,
    /// One word vector per physical column, in column order.
    words: Vec<Vec<u64>>,
    diagnostics: Vec<ClipDiagnostic>,
}

/// Buffers one column's words and flushes them as full chunks.
struct ColumnSink {
    name: String,
    chunk_rows: usize,
    pending: Vec<u64>,
    chunks: Vec<crate::format::ChunkMeta>,
}

impl ColumnSink {
    fn new(name: &str, chunk_rows: usize) -> Self {
        Self {
            name: name.to_string(),
            chunk_rows,
            pending: Vec::with_capacity(chunk_rows),
            chunks: Vec::new(),
        }
    }

    fn extend(&mut self, words: &[u64], staged: &mut StagedStore) -> Result<(), IngestError> {
        for word in words {
            self.pending.push(*word);
            if self.pending.len() == self.chunk_rows {
                self.flush(staged)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, staged: &mut StagedStore) -> Result<(), IngestError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let (bytes, crc) = encode_chunk(&self.pending);
        let meta = staged.append_chunk(&bytes, self.pending.len() as u32, crc)?;
        self.chunks.push(meta);
        self.pending.clear();
        Ok(())
    }

    fn finish(mut self, staged: &mut StagedStore) -> Result<ColumnLayout, IngestError> {
        self.flush(staged)?;
        Ok(ColumnLayout {
            name: self.name,
            chunks: self.chunks,
        })
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{collections::HashMap, path::Path};

use core_types::{AssetId, BundleConfig};
use log::{debug, warn};
use rayon::prelude::*;
use session_calendar::{date_from_timestamp, SessionCalendar, SessionRange};
use time::Date;

use crate::{
    attributes::{validate_columns, AssetIndex, StoreAttributes},
    codec::ValueCodec,
    column::{ColumnHandle, ColumnKind, PointCache},
    error::{FormatError, ReadError, Result},
    format::FORMAT_VERSION,
    gather::{compute_row_slices, gather_column, GatherStrategy, Matrix},
    storage::MappedStore,
};

/// Read-only handle on a sealed store.
///
/// Opening validates the header, attribute checksum, column directory and asset index; after
/// that every lookup is served from the memory map without further coordination, so a reader
/// can be shared across threads.
pub struct StoreReader {
    store: MappedStore,
    attrs: StoreAttributes,
    codec: ValueCodec,
    sessions: SessionRange,
    index: AssetIndex,
    column_positions: HashMap<String, usize>,
    read_all_threshold: usize,
    point_cache: PointCache,
}

impl StoreReader {
    pub fn open<C: SessionCalendar + ?Sized>(
        path: impl AsRef<Path>,
        calendar: &C,
        read_all_threshold: usize,
    ) -> Result<Self> {
        let store = MappedStore::open(path.as_ref())?;
        let attrs: StoreAttributes =
            serde_json::from_slice(store.attributes_bytes()?).map_err(FormatError::from)?;
        if attrs.format_version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: attrs.format_version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        if attrs.calendar_name != calendar.name() {
            return Err(ReadError::CalendarMismatch {
                stored: attrs.calendar_name.clone(),
                supplied: calendar.name().to_string(),
            });
        }
        let (start, end) = match (
            date_from_timestamp(attrs.start_session),
            date_from_timestamp(attrs.end_session),
        ) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(ReadError::CorruptIndex {
                    reason: format!(
                        "session bounds {}..{} are outside the representable date range",
                        attrs.start_session, attrs.end_session
                    ),
                })
            }
        };
        let sessions = SessionRange::from_calendar(calendar, start, end);
        if sessions.first() != Some(start) || sessions.last() != Some(end) {
            return Err(ReadError::CorruptIndex {
                reason: format!(
                    "calendar {} does not contain stored session bounds {start}..{end}",
                    calendar.name()
                ),
            });
        }
        validate_columns(&attrs)?;
        let index = AssetIndex::from_attributes(&attrs, sessions.len())?;
        let column_positions = attrs
            .columns
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.name.clone(), pos))
            .collect();
        let codec = attrs.encoding.into();
        debug!(
            "opened column store {:?}: {} assets, {} rows, sessions {}..={}, {}",
            store.path(),
            index.len(),
            attrs.total_rows,
            start,
            end,
            attrs.encoding
        );
        Ok(Self {
            store,
            attrs,
            codec,
            sessions,
            index,
            column_positions,
            read_all_threshold,
            point_cache: PointCache::default(),
        })
    }

    /// Opens with the bundle's gather threshold; the store's own attributes decide encoding.
    pub fn open_with_config<C: SessionCalendar + ?Sized>(
        config: &BundleConfig,
        path: impl AsRef<Path>,
        calendar: &C,
    ) -> Result<Self> {
        let reader = Self::open(path, calendar, config.read_all_threshold)?;
        if reader.attrs.encoding != config.encoding {
            warn!(
                "bundle {} configures {} but store {:?} was written as {}",
                config.name,
                config.encoding,
                reader.path(),
                reader.attrs.encoding
            );
        }
        Ok(reader)
    }

    pub fn with_read_all_threshold(mut self, read_all_threshold: usize) -> Self {
        self.read_all_threshold = read_all_threshold;
        self
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn codec(&self) -> ValueCodec {
        self.codec
    }

    pub fn fields(&self) -> &[String] {
        &self.attrs.fields
    }

    pub fn total_rows(&self) -> u64 {
        self.attrs.total_rows
    }

    pub fn read_all_threshold(&self) -> usize {
        self.read_all_threshold
    }

    pub fn attributes(&self) -> &StoreAttributes {
        &self.attrs
    }

    /// All sessions the store spans, from its start session to its end session.
    pub fn sessions(&self) -> &SessionRange {
        &self.sessions
    }

    pub fn first_trading_day(&self) -> Option<Date> {
        self.attrs.first_trading_day.and_then(date_from_timestamp)
    }

    pub fn first_available_session(&self) -> Option<Date> {
        self.sessions.first()
    }

    pub fn last_available_session(&self) -> Option<Date> {
        self.sessions.last()
    }

    /// Assets in row-space order.
    pub fn assets(&self) -> &[AssetId] {
        self.index.assets()
    }

    pub fn contains(&self, asset: AssetId) -> bool {
        self.index.contains(asset)
    }

    /// First and last session of the asset's stored series.
    pub fn asset_window(&self, asset: AssetId) -> Result<(Date, Date)> {
        let span = self.index.get(asset)?;
        let first = self.session_at(span.calendar_offset)?;
        let last = self.session_at(span.last_offset())?;
        Ok((first, last))
    }

    /// Decoded value of `field` for `asset` on session `date`.
    pub fn get_value(&self, asset: AssetId, date: Date, field: &str) -> Result<f64> {
        let column = self.column(field)?;
        let row = self.row_for(asset, date)?;
        let word = column.read_word(row, &self.point_cache)?;
        Ok(column.decode(word))
    }

    /// Latest session at or before `date` whose stored `field` value is not missing.
    pub fn last_valid_session(&self, asset: AssetId, field: &str, date: Date) -> Result<Option<Date>> {
        let column = self.column(field)?;
        let span = *self.index.get(asset)?;
        let day_idx = self
            .sessions
            .index_of(date)
            .ok_or(ReadError::NotASession { date })?;
        if day_idx < span.calendar_offset {
            return Ok(None);
        }
        let last_idx = day_idx.min(span.last_offset());
        let last_row = span.first_row + (last_idx - span.calendar_offset) as u64;
        if column.kind != ColumnKind::Field {
            return self.session_at(last_idx).map(Some);
        }
        let missing = self.codec.missing_word();
        let mut latest = None;
        column
            .cursor()
            .for_each_in(span.first_row, last_row, |i, word| {
                if word != missing {
                    latest = Some(i);
                }
            })?;
        latest
            .map(|i| self.session_at(span.calendar_offset + i))
            .transpose()
    }

    /// One `(session × asset)` matrix per requested column over sessions `start..=end`.
    ///
    /// Cells outside an asset's stored window are NaN. Columns are decoded in parallel and the
    /// call fails as a whole if any column fails.
    pub fn load(
        &self,
        columns: &[&str],
        start: Date,
        end: Date,
        assets: &[AssetId],
    ) -> Result<Vec<Matrix>> {
        if start > end {
            return Err(ReadError::InvalidRange { start, end });
        }
        let start_idx = self
            .sessions
            .index_of(start)
            .ok_or(ReadError::NotASession { date: start })?;
        let end_idx = self
            .sessions
            .index_of(end)
            .ok_or(ReadError::NotASession { date: end })?;
        let handles = columns
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>>>()?;
        let slices = compute_row_slices(&self.index, start_idx, end_idx, assets)?;
        let strategy = GatherStrategy::select(assets.len(), self.read_all_threshold);
        let rows = end_idx - start_idx + 1;
        debug!(
            "loading {} columns x {} sessions x {} assets using {:?} gather",
            handles.len(),
            rows,
            assets.len(),
            strategy
        );
        let matrices = handles
            .par_iter()
            .map(|column| gather_column(column, rows, &slices, strategy))
            .collect::<std::result::Result<Vec<_>, FormatError>>()?;
        Ok(matrices)
    }

    fn column(&self, name: &str) -> Result<ColumnHandle<'_>> {
        let pos = self
            .column_positions
            .get(name)
            .copied()
            .ok_or_else(|| ReadError::UnknownColumn {
                column: name.to_string(),
            })?;
        let layout = &self.attrs.columns[pos];
        Ok(ColumnHandle::new(
            &layout.name,
            &layout.chunks,
            self.attrs.chunk_rows as usize,
            &self.store,
            self.codec,
        ))
    }

    fn row_for(&self, asset: AssetId, date: Date) -> Result<u64> {
        let day_idx = self
            .sessions
            .index_of(date)
            .ok_or(ReadError::NotASession { date })?;
        let span = self.index.get(asset)?;
        if day_idx < span.calendar_offset {
            return Err(ReadError::NoDataBeforeDate {
                asset,
                date,
                first: self.session_at(span.calendar_offset)?,
            });
        }
        match span.row_for_offset(day_idx) {
            Some(row) => Ok(row),
            None => Err(ReadError::NoDataAfterDate {
                asset,
                date,
                last: self.session_at(span.last_offset())?,
            }),
        }
    }

    fn session_at(&self, idx: usize) -> Result<Date> {
        self.sessions.get(idx).ok_or_else(|| ReadError::CorruptIndex {
            reason: format!("session index {idx} outside store range"),
        })
    }
}

impl std::fmt::Debug for StoreReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreReader")
            .field("path", &self.store.path())
            .field("encoding", &self.attrs.encoding)
            .field("assets", &self.index.len())
            .field("total_rows", &self.attrs.total_rows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        table::AssetTable,
        writer::{StoreWriter, WriterOptions},
    };
    use core_types::Encoding;
    use session_calendar::{CalendarBuilder, WeekdayCalendar};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};
    use time::macros::date;

    fn calendar() -> WeekdayCalendar {
        CalendarBuilder::new("XTEST", date!(2024 - 01 - 01), date!(2024 - 02 - 29))
            .holidays([date!(2024 - 01 - 01), date!(2024 - 01 - 15)])
            .build()
            .unwrap()
    }

    /// Asset 7 trades Jan 3..=Jan 9 with a gap in `close` on Jan 8.
    fn written(encoding: Encoding) -> (TempDir, PathBuf, WeekdayCalendar) {
        let cal = calendar();
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let days = cal.slice(date!(2024 - 01 - 03), date!(2024 - 01 - 09)).to_vec();
        let table = AssetTable::new(days)
            .unwrap()
            .with_column(
                "close",
                vec![Some(1.5), Some(2.5), Some(3.5), None, Some(5.5)],
            )
            .unwrap()
            .with_values("volume", vec![100.0, 200.0, 300.0, 400.0, 500.0])
            .unwrap();
        let options = WriterOptions::new(vec!["close".into(), "volume".into()], encoding)
            .with_chunk_rows(2);
        StoreWriter::new(&path, &cal, date!(2024 - 01 - 02), date!(2024 - 01 - 31), options)
            .unwrap()
            .write([(7, table)], None)
            .unwrap();
        (dir, path, cal)
    }

    #[test]
    fn point_lookup_and_bounds() {
        let (_dir, path, cal) = written(Encoding::ScaledFixedPoint { scale: 1000 });
        let reader = StoreReader::open(&path, &cal, 10).unwrap();
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 04), "close").unwrap(), 2.5);
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 09), "volume").unwrap(), 500.0);
        assert!(reader.get_value(7, date!(2024 - 01 - 08), "close").unwrap().is_nan());
        assert_eq!(
            reader.get_value(7, date!(2024 - 01 - 03), "day").unwrap(),
            1_704_240_000.0
        );
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 03), "id").unwrap(), 7.0);

        assert!(matches!(
            reader.get_value(7, date!(2024 - 01 - 02), "close"),
            Err(ReadError::NoDataBeforeDate { first, .. }) if first == date!(2024 - 01 - 03)
        ));
        assert!(matches!(
            reader.get_value(7, date!(2024 - 01 - 10), "close"),
            Err(ReadError::NoDataAfterDate { last, .. }) if last == date!(2024 - 01 - 09)
        ));
        assert!(matches!(
            reader.get_value(7, date!(2024 - 01 - 06), "close"),
            Err(ReadError::NotASession { .. })
        ));
        assert!(matches!(
            reader.get_value(8, date!(2024 - 01 - 04), "close"),
            Err(ReadError::AssetNotFound { asset: 8 })
        ));
        assert!(matches!(
            reader.get_value(7, date!(2024 - 01 - 04), "open"),
            Err(ReadError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn point_lookups_reuse_the_last_chunk() {
        let (_dir, path, cal) = written(Encoding::ScaledFixedPoint { scale: 1000 });
        let reader = StoreReader::open(&path, &cal, 10).unwrap();
        // chunk_rows is 2: Jan 3/4 share chunk 0, Jan 5/8 chunk 1, Jan 9 chunk 2.
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 03), "close").unwrap(), 1.5);
        assert_eq!(reader.point_cache.cached(), Some(("close".to_string(), 0)));
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 04), "close").unwrap(), 2.5);
        assert_eq!(reader.point_cache.cached(), Some(("close".to_string(), 0)));
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 04), "volume").unwrap(), 200.0);
        assert_eq!(reader.point_cache.cached(), Some(("volume".to_string(), 0)));
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 09), "close").unwrap(), 5.5);
        assert_eq!(reader.point_cache.cached(), Some(("close".to_string(), 2)));
        assert_eq!(reader.get_value(7, date!(2024 - 01 - 05), "close").unwrap(), 3.5);
        assert!(reader.get_value(7, date!(2024 - 01 - 08), "close").unwrap().is_nan());
        assert_eq!(reader.point_cache.cached(), Some(("close".to_string(), 1)));
    }

    #[test]
    fn metadata_reflects_written_store() {
        let (_dir, path, cal) = written(Encoding::RawFloat { sentinel: -1.0 });
        let reader = StoreReader::open(&path, &cal, 10).unwrap();
        assert_eq!(reader.fields(), &["close".to_string(), "volume".to_string()]);
        assert_eq!(reader.total_rows(), 5);
        assert_eq!(reader.assets(), &[7]);
        assert_eq!(reader.first_trading_day(), Some(date!(2024 - 01 - 03)));
        assert_eq!(reader.first_available_session(), Some(date!(2024 - 01 - 02)));
        assert_eq!(reader.last_available_session(), Some(date!(2024 - 01 - 31)));
        assert_eq!(
            reader.asset_window(7).unwrap(),
            (date!(2024 - 01 - 03), date!(2024 - 01 - 09))
        );
        assert_eq!(reader.codec(), ValueCodec::RawFloat { sentinel: -1.0 });
    }

    #[test]
    fn last_valid_session_skips_missing_values() {
        let (_dir, path, cal) = written(Encoding::ScaledFixedPoint { scale: 1000 });
        let reader = StoreReader::open(&path, &cal, 10).unwrap();
        assert_eq!(
            reader.last_valid_session(7, "close", date!(2024 - 01 - 08)).unwrap(),
            Some(date!(2024 - 01 - 05))
        );
        assert_eq!(
            reader.last_valid_session(7, "close", date!(2024 - 01 - 30)).unwrap(),
            Some(date!(2024 - 01 - 09))
        );
        assert_eq!(
            reader.last_valid_session(7, "close", date!(2024 - 01 - 02)).unwrap(),
            None
        );
    }

    #[test]
    fn calendar_must_match() {
        let (_dir, path, _cal) = written(Encoding::default());
        let other = WeekdayCalendar::new("OTHER", date!(2024 - 01 - 01), date!(2024 - 02 - 29)).unwrap();
        assert!(matches!(
            StoreReader::open(&path, &other, 10),
            Err(ReadError::CalendarMismatch { .. })
        ));
    }

    #[test]
    fn load_rejects_bad_ranges() {
        let (_dir, path, cal) = written(Encoding::default());
        let reader = StoreReader::open(&path, &cal, 10).unwrap();
        assert!(matches!(
            reader.load(&["close"], date!(2024 - 01 - 09), date!(2024 - 01 - 03), &[7]),
            Err(ReadError::InvalidRange { .. })
        ));
        assert!(matches!(
            reader.load(&["close", "nope"], date!(2024 - 01 - 03), date!(2024 - 01 - 09), &[7]),
            Err(ReadError::UnknownColumn { .. })
        ));
        assert!(matches!(
            reader.load(&["close"], date!(2024 - 01 - 03), date!(2024 - 01 - 09), &[7, 9]),
            Err(ReadError::AssetNotFound { asset: 9 })
        ));
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::{BTreeMap, HashMap};

use core_types::{AssetId, Encoding};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ReadError, Result},
    format::ChunkMeta,
    table::{DAY_COLUMN, ID_COLUMN},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub name: String,
    pub chunks: Vec<ChunkMeta>,
}

impl ColumnLayout {
    pub fn rows(&self) -> u64 {
        self.chunks.iter().map(|c| c.rows as u64).sum()
    }
}

/// The attribute block persisted at the tail of every store.
///
/// Asset maps are keyed by the decimal asset id so the block stays readable by tools that
/// only understand string-keyed JSON objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreAttributes {
    pub format_version: u32,
    pub encoding: Encoding,
    pub fields: Vec<String>,
    pub chunk_rows: u32,
    pub total_rows: u64,
    /// Earliest first day across all assets, as midnight-UTC unix seconds.
    pub first_trading_day: Option<i64>,
    pub first_row: BTreeMap<String, u64>,
    pub last_row: BTreeMap<String, u64>,
    pub calendar_offset: BTreeMap<String, u64>,
    pub calendar_name: String,
    pub start_session: i64,
    pub end_session: i64,
    pub created_at_s: i64,
    pub columns: Vec<ColumnLayout>,
}

impl StoreAttributes {
    pub fn record_span(&mut self, asset: AssetId, span: AssetSpan) {
        let key = asset.to_string();
        self.first_row.insert(key.clone(), span.first_row);
        self.last_row.insert(key.clone(), span.last_row);
        self.calendar_offset.insert(key, span.calendar_offset as u64);
    }

    /// Physical column order: tracked fields, then `day`, then `id`.
    pub fn expected_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain([DAY_COLUMN, ID_COLUMN])
            .collect()
    }
}

/// Where one asset's rows sit in the shared row space and in session space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetSpan {
    pub first_row: u64,
    pub last_row: u64,
    /// Index of the asset's first session within the store's session range.
    pub calendar_offset: usize,
}

impl AssetSpan {
    pub fn len(&self) -> usize {
        (self.last_row - self.first_row + 1) as usize
    }

    /// Session index of the asset's last row.
    pub fn last_offset(&self) -> usize {
        self.calendar_offset + self.len() - 1
    }

    pub fn row_for_offset(&self, session_idx: usize) -> Option<u64> {
        if session_idx < self.calendar_offset || session_idx > self.last_offset() {
            return None;
        }
        Some(self.first_row + (session_idx - self.calendar_offset) as u64)
    }
}

/// Validated per-asset index of a sealed store.
#[derive(Clone, Debug)]
pub struct AssetIndex {
    spans: HashMap<AssetId, AssetSpan>,
    order: Vec<AssetId>,
}

impl AssetIndex {
    pub fn from_attributes(attrs: &StoreAttributes, session_count: usize) -> Result<Self> {
        if attrs.first_row.len() != attrs.last_row.len()
            || attrs.first_row.len() != attrs.calendar_offset.len()
        {
            return corrupt("first_row, last_row and calendar_offset cover different assets");
        }
        let mut spans = HashMap::with_capacity(attrs.first_row.len());
        let mut ordered = Vec::with_capacity(attrs.first_row.len());
        for (key, &first_row) in &attrs.first_row {
            let asset: AssetId = key
                .parse()
                .map_err(|_| corrupt_err(format!("asset key {key:?} is not an id")))?;
            let last_row = *attrs
                .last_row
                .get(key)
                .ok_or_else(|| corrupt_err(format!("asset {asset} has no last_row")))?;
            let offset = *attrs
                .calendar_offset
                .get(key)
                .ok_or_else(|| corrupt_err(format!("asset {asset} has no calendar_offset")))?;
            if first_row > last_row {
                return corrupt(format!("asset {asset} first_row {first_row} > last_row {last_row}"));
            }
            if last_row >= attrs.total_rows {
                return corrupt(format!(
                    "asset {asset} last_row {last_row} beyond total_rows {}",
                    attrs.total_rows
                ));
            }
            let span = AssetSpan {
                first_row,
                last_row,
                calendar_offset: offset as usize,
            };
            if offset as usize + span.len() > session_count {
                return corrupt(format!(
                    "asset {asset} window of {} sessions at offset {offset} exceeds {session_count} sessions",
                    span.len()
                ));
            }
            spans.insert(asset, span);
            ordered.push((first_row, asset));
        }

        ordered.sort_unstable();
        let mut next_row = 0u64;
        for (first_row, asset) in &ordered {
            if *first_row != next_row {
                return corrupt(format!(
                    "asset {asset} starts at row {first_row}, expected {next_row}"
                ));
            }
            next_row = spans[asset].last_row + 1;
        }
        if next_row != attrs.total_rows {
            return corrupt(format!(
                "asset rows cover {next_row} of {} total rows",
                attrs.total_rows
            ));
        }

        Ok(Self {
            spans,
            order: ordered.into_iter().map(|(_, asset)| asset).collect(),
        })
    }

    pub fn get(&self, asset: AssetId) -> Result<&AssetSpan> {
        self.spans
            .get(&asset)
            .ok_or(ReadError::AssetNotFound { asset })
    }

    pub fn contains(&self, asset: AssetId) -> bool {
        self.spans.contains_key(&asset)
    }

    /// Assets in row-space order.
    pub fn assets(&self) -> &[AssetId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Checks the column directory against the declared fields and row count.
pub fn validate_columns(attrs: &StoreAttributes) -> Result<()> {
    let expected = attrs.expected_columns();
    let actual: Vec<&str> = attrs.columns.iter().map(|c| c.name.as_str()).collect();
    if expected != actual {
        return corrupt(format!("column directory {actual:?} does not match {expected:?}"));
    }
    if attrs.chunk_rows == 0 {
        return corrupt("chunk_rows is zero");
    }
    for column in &attrs.columns {
        if column.rows() != attrs.total_rows {
            return corrupt(format!(
                "column {} holds {} rows, store has {}",
                column.name,
                column.rows(),
                attrs.total_rows
            ));
        }
        let full_chunks = column.chunks.len().saturating_sub(1);
        if column.chunks[..full_chunks]
            .iter()
            .any(|c| c.rows != attrs.chunk_rows)
        {
            return corrupt(format!("column {} has a short inner chunk", column.name));
        }
    }
    Ok(())
}

fn corrupt_err(reason: impl Into<String>) -> ReadError {
    ReadError::CorruptIndex {
        reason: reason.into(),
    }
}

fn corrupt<T>(reason: impl Into<String>) -> Result<T> {
    Err(corrupt_err(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FORMAT_VERSION;

    fn attrs(spans: &[(AssetId, u64, u64, u64)], total_rows: u64) -> StoreAttributes {
        let mut attrs = StoreAttributes {
            format_version: FORMAT_VERSION,
            encoding: Encoding::ScaledFixedPoint { scale: 1000 },
            fields: vec!["close".into()],
            chunk_rows: 4,
            total_rows,
            first_trading_day: None,
            first_row: BTreeMap::new(),
            last_row: BTreeMap::new(),
            calendar_offset: BTreeMap::new(),
            calendar_name: "TEST".into(),
            start_session: 0,
            end_session: 0,
            created_at_s: 0,
            columns: Vec::new(),
        };
        for &(asset, first_row, last_row, offset) in spans {
            attrs.record_span(
                asset,
                AssetSpan {
                    first_row,
                    last_row,
                    calendar_offset: offset as usize,
                },
            );
        }
        attrs
    }

    #[test]
    fn index_orders_assets_by_row() {
        let attrs = attrs(&[(20, 0, 2, 0), (3, 3, 4, 1)], 5);
        let index = AssetIndex::from_attributes(&attrs, 3).unwrap();
        assert_eq!(index.assets(), &[20, 3]);
        let span = index.get(3).unwrap();
        assert_eq!(span.len(), 2);
        assert_eq!(span.last_offset(), 2);
        assert_eq!(span.row_for_offset(1), Some(3));
        assert_eq!(span.row_for_offset(0), None);
        assert!(matches!(index.get(9), Err(ReadError::AssetNotFound { asset: 9 })));
    }

    #[test]
    fn gaps_and_overruns_are_corrupt() {
        let gap = attrs(&[(1, 0, 1, 0), (2, 3, 4, 0)], 5);
        assert!(matches!(
            AssetIndex::from_attributes(&gap, 10),
            Err(ReadError::CorruptIndex { .. })
        ));
        let short = attrs(&[(1, 0, 1, 0)], 5);
        assert!(AssetIndex::from_attributes(&short, 10).is_err());
        let beyond_calendar = attrs(&[(1, 0, 4, 2)], 5);
        assert!(AssetIndex::from_attributes(&beyond_calendar, 6).is_err());
        assert!(AssetIndex::from_attributes(&beyond_calendar, 7).is_ok());
    }

    #[test]
    fn column_directory_must_cover_all_rows() {
        let mut attrs = attrs(&[(1, 0, 4, 0)], 5);
        let chunk = |rows| ChunkMeta {
            offset: 64,
            len: 1,
            rows,
            crc32: 0,
        };
        for name in ["close", DAY_COLUMN, ID_COLUMN] {
            attrs.columns.push(ColumnLayout {
                name: name.into(),
                chunks: vec![chunk(4), chunk(1)],
            });
        }
        assert!(validate_columns(&attrs).is_ok());
        attrs.columns[1].chunks = vec![chunk(2), chunk(3)];
        assert!(validate_columns(&attrs).is_err());
        attrs.columns.swap(0, 2);
        assert!(validate_columns(&attrs).is_err());
    }
}

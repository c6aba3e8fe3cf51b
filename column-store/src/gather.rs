// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Bulk load of `(session × asset)` matrices.
//!
//! Each requested asset maps to at most one contiguous run of source rows. The kernel either
//! decompresses a whole column once and slices it ([`GatherStrategy::Bulk`]) or walks only the
//! chunks the runs touch ([`GatherStrategy::Selective`]). Both produce identical output.

use core_types::AssetId;

use crate::{
    attributes::AssetIndex,
    column::ColumnHandle,
    error::{FormatError, Result},
};

/// Dense row-major `f64` matrix: one row per session, one column per requested asset.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Matrix {
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row < self.rows {
            Some(&self.values[row * self.cols..(row + 1) * self.cols])
        } else {
            None
        }
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().skip(col).step_by(self.cols.max(1)).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.cols + col] = value;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatherStrategy {
    /// Decompress every requested column in full, then slice.
    Bulk,
    /// Decompress only the chunks the requested assets touch.
    Selective,
}

impl GatherStrategy {
    pub fn select(asset_count: usize, read_all_threshold: usize) -> Self {
        if asset_count > read_all_threshold {
            GatherStrategy::Bulk
        } else {
            GatherStrategy::Selective
        }
    }
}

/// Source rows `first_row..=last_row` land at output rows starting at `out_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowSlice {
    pub first_row: u64,
    pub last_row: u64,
    pub out_offset: usize,
}

/// Intersects each asset's stored window with sessions `start_idx..=end_idx`.
/// `None` marks an asset with no rows in the window.
pub(crate) fn compute_row_slices(
    index: &AssetIndex,
    start_idx: usize,
    end_idx: usize,
    assets: &[AssetId],
) -> Result<Vec<Option<RowSlice>>> {
    assets
        .iter()
        .map(|asset| {
            let span = index.get(*asset)?;
            let asset_start = span.calendar_offset;
            let asset_end = span.last_offset();
            if asset_end < start_idx || asset_start > end_idx {
                return Ok(None);
            }
            Ok(Some(RowSlice {
                first_row: span.first_row + start_idx.saturating_sub(asset_start) as u64,
                last_row: span.last_row - asset_end.saturating_sub(end_idx) as u64,
                out_offset: asset_start.saturating_sub(start_idx),
            }))
        })
        .collect()
}

pub(crate) fn gather_column(
    column: &ColumnHandle<'_>,
    rows: usize,
    slices: &[Option<RowSlice>],
    strategy: GatherStrategy,
) -> std::result::Result<Matrix, FormatError> {
    let mut out = Matrix::filled(rows, slices.len(), f64::NAN);
    match strategy {
        GatherStrategy::Bulk => {
            let words = column.read_all()?;
            for (col, slice) in slices.iter().enumerate() {
                let Some(slice) = slice else { continue };
                let source = words
                    .get(slice.first_row as usize..=slice.last_row as usize)
                    .ok_or_else(|| FormatError::Truncated {
                        detail: format!(
                            "column {} has no rows {}..={}",
                            column.name, slice.first_row, slice.last_row
                        ),
                    })?;
                for (i, word) in source.iter().enumerate() {
                    out.set(slice.out_offset + i, col, column.decode(*word));
                }
            }
        }
        GatherStrategy::Selective => {
            let mut cursor = column.cursor();
            for (col, slice) in slices.iter().enumerate() {
                let Some(slice) = slice else { continue };
                cursor.for_each_in(slice.first_row, slice.last_row, |i, word| {
                    out.set(slice.out_offset + i, col, column.decode(word));
                })?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AssetSpan, StoreAttributes};
    use crate::format::FORMAT_VERSION;
    use core_types::Encoding;
    use std::collections::BTreeMap;

    fn index() -> AssetIndex {
        // A: sessions 0..=2, B: sessions 1..=2, C: sessions 5..=6.
        let mut attrs = StoreAttributes {
            format_version: FORMAT_VERSION,
            encoding: Encoding::default(),
            fields: vec!["close".into()],
            chunk_rows: 8,
            total_rows: 7,
            first_trading_day: None,
            first_row: BTreeMap::new(),
            last_row: BTreeMap::new(),
            calendar_offset: BTreeMap::new(),
            calendar_name: "T".into(),
            start_session: 0,
            end_session: 0,
            created_at_s: 0,
            columns: Vec::new(),
        };
        for (asset, first_row, last_row, offset) in [(1, 0, 2, 0), (2, 3, 4, 1), (3, 5, 6, 5)] {
            attrs.record_span(
                asset,
                AssetSpan {
                    first_row,
                    last_row,
                    calendar_offset: offset,
                },
            );
        }
        AssetIndex::from_attributes(&attrs, 7).unwrap()
    }

    #[test]
    fn slices_clip_to_the_query_window() {
        let slices = compute_row_slices(&index(), 1, 5, &[1, 2, 3]).unwrap();
        assert_eq!(
            slices,
            vec![
                Some(RowSlice {
                    first_row: 1,
                    last_row: 2,
                    out_offset: 0
                }),
                Some(RowSlice {
                    first_row: 3,
                    last_row: 4,
                    out_offset: 0
                }),
                Some(RowSlice {
                    first_row: 5,
                    last_row: 5,
                    out_offset: 4
                }),
            ]
        );
    }

    #[test]
    fn disjoint_windows_yield_none() {
        let slices = compute_row_slices(&index(), 3, 4, &[1, 2, 3]).unwrap();
        assert_eq!(slices, vec![None, None, None]);
        assert!(compute_row_slices(&index(), 0, 1, &[42]).is_err());
    }

    #[test]
    fn strategy_threshold_is_strict() {
        assert_eq!(GatherStrategy::select(3000, 3000), GatherStrategy::Selective);
        assert_eq!(GatherStrategy::select(3001, 3000), GatherStrategy::Bulk);
    }

    #[test]
    fn matrix_accessors() {
        let mut m = Matrix::filled(2, 3, f64::NAN);
        m.set(1, 2, 4.0);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.get(1, 2), Some(4.0));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.column(2).filter(|v| !v.is_nan()).collect::<Vec<_>>(), vec![4.0]);
        assert!(m.row(0).unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(m.row(1).unwrap()[2], 4.0);
        assert!(m.row(2).is_none());
    }
}

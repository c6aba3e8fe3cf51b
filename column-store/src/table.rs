// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::BTreeMap;

use arrow::{
    array::{Array, Date32Array, Float64Array, Int64Array},
    datatypes::DataType,
    record_batch::RecordBatch,
};
use core_types::RESERVED_COLUMNS;
use session_calendar::SessionCalendar;
use time::{Date, Duration, OffsetDateTime};

use crate::error::TableError;

pub const DAY_COLUMN: &str = "day";
pub const ID_COLUMN: &str = "id";

/// One asset's daily rows as supplied by the upstream parser: a session per row plus the
/// tracked field values, where `None` is a null.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetTable {
    days: Vec<Date>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl AssetTable {
    pub fn new(days: Vec<Date>) -> Result<Self, TableError> {
        if let Some(pos) = days.windows(2).position(|w| w[0] >= w[1]) {
            return Err(TableError::UnsortedDays { row: pos + 1 });
        }
        Ok(Self {
            days,
            columns: BTreeMap::new(),
        })
    }

    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        if RESERVED_COLUMNS.contains(&name.as_str()) {
            return Err(TableError::ReservedColumn { column: name });
        }
        if values.len() != self.days.len() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.days.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    /// Same as [`Self::with_column`] for columns without nulls.
    pub fn with_values(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, TableError> {
        self.with_column(name, values.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn days(&self) -> &[Date] {
        &self.days
    }

    pub fn first_day(&self) -> Option<Date> {
        self.days.first().copied()
    }

    pub fn last_day(&self) -> Option<Date> {
        self.days.last().copied()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Aligns the table onto every calendar session between its first and last day.
    ///
    /// Sessions with no row take `fill` (or null); rows on non-session days are dropped.
    pub fn reindex_to_sessions<C: SessionCalendar + ?Sized>(
        &self,
        calendar: &C,
        fill: Option<f64>,
    ) -> AssetTable {
        let (Some(first), Some(last)) = (self.first_day(), self.last_day()) else {
            return self.clone();
        };
        let sessions = calendar.slice(first, last);
        let positions: Vec<Option<usize>> = sessions
            .iter()
            .map(|session| self.days.binary_search(session).ok())
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let aligned = positions
                    .iter()
                    .map(|pos| match pos {
                        Some(row) => values[*row],
                        None => fill,
                    })
                    .collect();
                (name.clone(), aligned)
            })
            .collect();
        AssetTable {
            days: sessions.to_vec(),
            columns,
        }
    }
}

impl TryFrom<&RecordBatch> for AssetTable {
    type Error = TableError;

    /// Expects a `Date32` `day` column; every other column must be `Float64` or `Int64`.
    fn try_from(batch: &RecordBatch) -> Result<Self, Self::Error> {
        let schema = batch.schema();
        let day_idx = schema
            .index_of(DAY_COLUMN)
            .map_err(|_| TableError::MissingDayColumn)?;
        let day_array = batch.column(day_idx);
        let day_values = day_array
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| unsupported(DAY_COLUMN, day_array.data_type()))?;

        let mut days = Vec::with_capacity(batch.num_rows());
        for row in 0..day_values.len() {
            if day_values.is_null(row) {
                return Err(TableError::InvalidDay { row });
            }
            let day = date_from_epoch_days(day_values.value(row))
                .ok_or(TableError::InvalidDay { row })?;
            days.push(day);
        }

        let mut table = AssetTable::new(days)?;
        for (idx, field) in schema.fields().iter().enumerate() {
            if idx == day_idx {
                continue;
            }
            let array = batch.column(idx);
            let values: Vec<Option<f64>> = match array.data_type() {
                DataType::Float64 => array
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| unsupported(field.name(), array.data_type()))?
                    .iter()
                    .collect(),
                DataType::Int64 => array
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(|| unsupported(field.name(), array.data_type()))?
                    .iter()
                    .map(|v| v.map(|x| x as f64))
                    .collect(),
                other => return Err(unsupported(field.name(), other)),
            };
            table = table.with_column(field.name().clone(), values)?;
        }
        Ok(table)
    }
}

fn unsupported(column: &str, data_type: &DataType) -> TableError {
    TableError::UnsupportedColumnType {
        column: column.to_string(),
        data_type: data_type.to_string(),
    }
}

fn date_from_epoch_days(days: i32) -> Option<Date> {
    OffsetDateTime::UNIX_EPOCH
        .date()
        .checked_add(Duration::days(days as i64))
}

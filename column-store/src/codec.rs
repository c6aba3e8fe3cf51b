// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Numeric encoding shared by every column of a store.
//!
//! All columns are stored as 8-byte words. Under [`ValueCodec::ScaledFixedPoint`] a word is an
//! `i64`, under [`ValueCodec::RawFloat`] it is the bit pattern of an `f64`. Tracked fields go
//! through [`ValueCodec::encode`] / [`ValueCodec::decode`]; the `day` and `id` columns use the
//! plain integer helpers and never see the missing sentinel.
//!
//! Under fixed point, a true zero and a missing value share the stored word `0` and both decode
//! to NaN. Callers that need to tell them apart must use the raw float scheme with a sentinel
//! outside their value domain.

use core_types::{Encoding, InvalidDataBehavior};
use log::warn;
use thiserror::Error;

use crate::error::IngestError;

/// Largest integer magnitude an `f64` holds exactly.
const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

#[derive(Debug, Error, PartialEq)]
#[error("{count} values out of bounds for column {column} at rows {rows:?}")]
pub struct ValueRangeError {
    pub column: String,
    pub count: usize,
    pub rows: Vec<usize>,
}

/// Field values after the invalid-data policy ran, still in the raw domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Winsorised {
    pub values: Vec<f64>,
    /// Row positions replaced by the missing sentinel.
    pub coerced: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueCodec {
    ScaledFixedPoint { scale: u32 },
    RawFloat { sentinel: f64 },
}

impl From<Encoding> for ValueCodec {
    fn from(value: Encoding) -> Self {
        match value {
            Encoding::ScaledFixedPoint { scale } => ValueCodec::ScaledFixedPoint { scale },
            Encoding::RawFloat { sentinel } => ValueCodec::RawFloat { sentinel },
        }
    }
}

impl From<ValueCodec> for Encoding {
    fn from(value: ValueCodec) -> Self {
        match value {
            ValueCodec::ScaledFixedPoint { scale } => Encoding::ScaledFixedPoint { scale },
            ValueCodec::RawFloat { sentinel } => Encoding::RawFloat { sentinel },
        }
    }
}

impl ValueCodec {
    pub fn encoding(&self) -> Encoding {
        (*self).into()
    }

    /// Stored word meaning "no data".
    pub fn missing_word(&self) -> u64 {
        match *self {
            ValueCodec::ScaledFixedPoint { .. } => 0,
            ValueCodec::RawFloat { sentinel } => sentinel.to_bits(),
        }
    }

    /// Raw-domain value that encodes to [`Self::missing_word`].
    pub fn missing_raw(&self) -> f64 {
        match *self {
            ValueCodec::ScaledFixedPoint { .. } => 0.0,
            ValueCodec::RawFloat { sentinel } => sentinel,
        }
    }

    /// Largest raw magnitude that can be stored.
    pub fn bound(&self) -> f64 {
        match *self {
            ValueCodec::ScaledFixedPoint { scale } => i64::MAX as f64 / scale as f64,
            ValueCodec::RawFloat { .. } => f64::MAX,
        }
    }

    pub fn encode(&self, raw: f64) -> u64 {
        match *self {
            ValueCodec::ScaledFixedPoint { scale } => (raw * scale as f64).round() as i64 as u64,
            ValueCodec::RawFloat { .. } => raw.to_bits(),
        }
    }

    /// Inverse of [`Self::encode`]; the missing sentinel decodes to NaN.
    pub fn decode(&self, word: u64) -> f64 {
        match *self {
            ValueCodec::ScaledFixedPoint { scale } => {
                let stored = word as i64;
                if stored == 0 {
                    f64::NAN
                } else {
                    stored as f64 / scale as f64
                }
            }
            ValueCodec::RawFloat { sentinel } => {
                let value = f64::from_bits(word);
                if value == sentinel { f64::NAN } else { value }
            }
        }
    }

    /// Encodes an integer (`day` seconds, asset id) at the store's word width.
    pub fn encode_plain(&self, value: i64) -> u64 {
        match self {
            ValueCodec::ScaledFixedPoint { .. } => value as u64,
            ValueCodec::RawFloat { .. } => (value as f64).to_bits(),
        }
    }

    pub fn decode_plain(&self, word: u64) -> f64 {
        match self {
            ValueCodec::ScaledFixedPoint { .. } => word as i64 as f64,
            ValueCodec::RawFloat { .. } => f64::from_bits(word),
        }
    }

    pub fn is_out_of_range(&self, raw: f64) -> bool {
        raw.is_infinite() || raw.abs() > self.bound()
    }

    /// Runs the invalid-data policy over one column; must happen before encoding.
    ///
    /// `raise` fails on any null or out-of-range value, `warn` replaces them with the missing
    /// sentinel and logs the count, `ignore` replaces them silently.
    pub fn apply_policy(
        &self,
        column: &str,
        values: &[Option<f64>],
        behavior: InvalidDataBehavior,
    ) -> Result<Winsorised, ValueRangeError> {
        let missing = self.missing_raw();
        let mut out = Vec::with_capacity(values.len());
        let mut coerced = Vec::new();
        for (row, value) in values.iter().enumerate() {
            match value {
                Some(v) if !v.is_nan() && !self.is_out_of_range(*v) => out.push(*v),
                _ => {
                    coerced.push(row);
                    out.push(missing);
                }
            }
        }
        if !coerced.is_empty() {
            match behavior {
                InvalidDataBehavior::Raise => {
                    return Err(ValueRangeError {
                        column: column.to_string(),
                        count: coerced.len(),
                        rows: coerced,
                    });
                }
                InvalidDataBehavior::Warn => {
                    warn!(
                        "ignoring {} values in column {} because they are null or out of bounds for {}",
                        coerced.len(),
                        column,
                        self.encoding()
                    );
                }
                InvalidDataBehavior::Ignore => {}
            }
        }
        Ok(Winsorised {
            values: out,
            coerced,
        })
    }

    /// Guards the `day` column: the timestamp must fit the word width exactly.
    pub fn check_bound(&self, value: i64, column: &str) -> Result<(), IngestError> {
        let fits = match self {
            ValueCodec::ScaledFixedPoint { .. } => true,
            ValueCodec::RawFloat { .. } => value.unsigned_abs() <= MAX_EXACT_FLOAT_INT,
        };
        if fits {
            Ok(())
        } else {
            Err(IngestError::DateOverflow {
                column: column.to_string(),
                value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALED: ValueCodec = ValueCodec::ScaledFixedPoint { scale: 10_000 };
    const FLOAT: ValueCodec = ValueCodec::RawFloat { sentinel: 0.0 };

    #[test]
    fn scaled_roundtrip_within_resolution() {
        for raw in [10.0, -3.25, 0.123_456_78, 1_234_567.891_2, 5e-4] {
            let decoded = SCALED.decode(SCALED.encode(raw));
            assert!(
                (decoded - raw).abs() <= 1.0 / 10_000.0,
                "{raw} decoded as {decoded}"
            );
        }
        assert_eq!(SCALED.encode(10.0) as i64, 100_000);
    }

    #[test]
    fn missing_sentinel_decodes_to_nan() {
        assert!(SCALED.decode(SCALED.missing_word()).is_nan());
        assert!(FLOAT.decode(FLOAT.missing_word()).is_nan());
        let custom = ValueCodec::RawFloat { sentinel: -1.0 };
        assert!(custom.decode(custom.missing_word()).is_nan());
        assert_eq!(custom.decode(0f64.to_bits()), 0.0);
    }

    #[test]
    fn fixed_point_zero_is_indistinguishable_from_missing() {
        assert_eq!(SCALED.encode(0.0), SCALED.missing_word());
        assert!(SCALED.decode(SCALED.encode(0.0)).is_nan());
    }

    #[test]
    fn plain_words_skip_the_sentinel() {
        assert_eq!(SCALED.decode_plain(SCALED.encode_plain(0)), 0.0);
        assert_eq!(FLOAT.decode_plain(FLOAT.encode_plain(42)), 42.0);
        assert_eq!(SCALED.decode_plain(SCALED.encode_plain(1_704_153_600)), 1_704_153_600.0);
    }

    #[test]
    fn raise_reports_count_and_rows() {
        let values = [Some(1.0), Some(f64::INFINITY), None, Some(2.0), Some(1e300)];
        let err = SCALED
            .apply_policy("pe", &values, InvalidDataBehavior::Raise)
            .unwrap_err();
        assert_eq!(err.count, 3);
        assert_eq!(err.rows, vec![1, 2, 4]);
        assert_eq!(err.column, "pe");
    }

    #[test]
    fn warn_and_ignore_coerce_to_missing() {
        let values = [Some(1.0), Some(f64::NAN), Some(-1e300)];
        for behavior in [InvalidDataBehavior::Warn, InvalidDataBehavior::Ignore] {
            let out = SCALED.apply_policy("pe", &values, behavior).unwrap();
            assert_eq!(out.values, vec![1.0, 0.0, 0.0]);
            assert_eq!(out.coerced, vec![1, 2]);
        }
        let custom = ValueCodec::RawFloat { sentinel: -9.0 };
        let out = custom
            .apply_policy("close", &[None, Some(3.0)], InvalidDataBehavior::Ignore)
            .unwrap();
        assert_eq!(out.values, vec![-9.0, 3.0]);
    }

    #[test]
    fn raw_float_accepts_any_finite_value() {
        let values = [Some(f64::MAX), Some(-1e300)];
        let out = FLOAT
            .apply_policy("close", &values, InvalidDataBehavior::Raise)
            .unwrap();
        assert!(out.coerced.is_empty());
    }

    #[test]
    fn day_bound_depends_on_word_type() {
        let huge = (1i64 << 53) + 1;
        assert!(SCALED.check_bound(huge, "day").is_ok());
        assert!(FLOAT.check_bound(1 << 53, "day").is_ok());
        let err = FLOAT.check_bound(huge, "day").unwrap_err();
        assert!(matches!(err, IngestError::DateOverflow { value, .. } if value == huge));
    }
}

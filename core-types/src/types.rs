// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Identifier assigned to an asset by the upstream metadata layer.
pub type AssetId = u32;

/// Column names the store owns; tracked fields may not reuse them.
pub const RESERVED_COLUMNS: [&str; 2] = ["day", "id"];

/// Numeric scheme every column of a store is encoded under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Encoding {
    /// `round(raw * scale)` stored as `i64`; `0` means missing.
    ScaledFixedPoint { scale: u32 },
    /// Raw `f64`; `sentinel` means missing.
    RawFloat {
        #[serde(default)]
        sentinel: f64,
    },
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::RawFloat { sentinel: 0.0 }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::ScaledFixedPoint { scale } => write!(f, "scaled-int64(x{scale})"),
            Encoding::RawFloat { sentinel } => write!(f, "float64(missing={sentinel})"),
        }
    }
}

/// What to do with values that are null or exceed the representable bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidDataBehavior {
    Raise,
    #[default]
    Warn,
    Ignore,
}

impl FromStr for InvalidDataBehavior {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "raise" => Ok(InvalidDataBehavior::Raise),
            "warn" => Ok(InvalidDataBehavior::Warn),
            "ignore" => Ok(InvalidDataBehavior::Ignore),
            other => Err(format!(
                "unknown invalid data behavior {other:?}; expected raise, warn or ignore"
            )),
        }
    }
}

impl fmt::Display for InvalidDataBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvalidDataBehavior::Raise => "raise",
            InvalidDataBehavior::Warn => "warn",
            InvalidDataBehavior::Ignore => "ignore",
        };
        f.write_str(label)
    }
}

// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{collections::HashSet, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Encoding, InvalidDataBehavior, RESERVED_COLUMNS};

pub const DEFAULT_READ_ALL_THRESHOLD: usize = 3000;
pub const DEFAULT_CHUNK_ROWS: u32 = 64 * 1024;
const ENV_PREFIX: &str = "BUNDLE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),
    #[error("invalid bundle config: {reason}")]
    Invalid { reason: String },
}

/// Everything a writer or reader needs to know about one bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    pub name: String,
    pub root_dir: PathBuf,
    pub calendar_name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub invalid_data_behavior: InvalidDataBehavior,
    #[serde(default = "default_read_all_threshold")]
    pub read_all_threshold: usize,
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: u32,
}

fn default_read_all_threshold() -> usize {
    DEFAULT_READ_ALL_THRESHOLD
}

fn default_chunk_rows() -> u32 {
    DEFAULT_CHUNK_ROWS
}

impl BundleConfig {
    pub fn new(
        name: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        calendar_name: impl Into<String>,
        fields: Vec<String>,
        encoding: Encoding,
    ) -> Self {
        Self {
            name: name.into(),
            root_dir: root_dir.into(),
            calendar_name: calendar_name.into(),
            fields,
            encoding,
            invalid_data_behavior: InvalidDataBehavior::default(),
            read_all_threshold: DEFAULT_READ_ALL_THRESHOLD,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }

    /// Loads a bundle config from `path`, with `BUNDLE_*` environment variables taking precedence.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("fields"),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return invalid("bundle name is empty");
        }
        if self.calendar_name.trim().is_empty() {
            return invalid("calendar name is empty");
        }
        validate_fields(&self.fields)?;
        if let Encoding::ScaledFixedPoint { scale: 0 } = self.encoding {
            return invalid("scale factor must be positive");
        }
        if let Encoding::RawFloat { sentinel } = self.encoding {
            if sentinel.is_nan() {
                return invalid("missing sentinel must not be NaN");
            }
        }
        if self.chunk_rows == 0 {
            return invalid("chunk_rows must be positive");
        }
        Ok(())
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.root_dir.join(&self.name)
    }
}

/// Checks a tracked-field list: non-empty, unique, and clear of reserved column names.
pub fn validate_fields(fields: &[String]) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return invalid("at least one tracked field is required");
    }
    let mut seen = HashSet::new();
    for field in fields {
        if field.is_empty() {
            return invalid("field names must not be empty");
        }
        if RESERVED_COLUMNS.contains(&field.as_str()) {
            return invalid(format!("field name {field:?} is reserved"));
        }
        if !seen.insert(field.as_str()) {
            return invalid(format!("field {field:?} listed twice"));
        }
    }
    Ok(())
}

fn invalid<T>(reason: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid {
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn loads_toml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.toml");
        fs::write(
            &path,
            r#"
name = "sharadar-daily"
root_dir = "/var/lib/bundles"
calendar_name = "XNYS"
fields = ["marketcap", "pe"]

[encoding]
scheme = "scaled_fixed_point"
scale = 10000
"#,
        )
        .unwrap();

        let config = BundleConfig::load(&path).unwrap();
        assert_eq!(config.name, "sharadar-daily");
        assert_eq!(config.fields, fields(&["marketcap", "pe"]));
        assert_eq!(config.encoding, Encoding::ScaledFixedPoint { scale: 10000 });
        assert_eq!(config.invalid_data_behavior, InvalidDataBehavior::Warn);
        assert_eq!(config.read_all_threshold, DEFAULT_READ_ALL_THRESHOLD);
        assert_eq!(config.chunk_rows, DEFAULT_CHUNK_ROWS);
        assert_eq!(
            config.bundle_dir(),
            PathBuf::from("/var/lib/bundles/sharadar-daily")
        );
    }

    #[test]
    fn loads_raw_float_and_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.toml");
        fs::write(
            &path,
            r#"
name = "sep"
root_dir = "bundles"
calendar_name = "XNYS"
fields = ["open", "close"]
invalid_data_behavior = "raise"
read_all_threshold = 10

[encoding]
scheme = "raw_float"
"#,
        )
        .unwrap();

        let config = BundleConfig::load(&path).unwrap();
        assert_eq!(config.encoding, Encoding::RawFloat { sentinel: 0.0 });
        assert_eq!(config.invalid_data_behavior, InvalidDataBehavior::Raise);
        assert_eq!(config.read_all_threshold, 10);
    }

    #[test]
    fn rejects_reserved_and_duplicate_fields() {
        let mut config = BundleConfig::new(
            "b",
            "root",
            "XNYS",
            fields(&["close", "day"]),
            Encoding::default(),
        );
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.fields = fields(&["close", "close"]);
        assert!(config.validate().is_err());

        config.fields = fields(&["close"]);
        assert!(config.validate().is_ok());

        config.encoding = Encoding::ScaledFixedPoint { scale: 0 };
        assert!(config.validate().is_err());
    }
}

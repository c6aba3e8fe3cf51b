// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    fs,
    path::{Path, PathBuf},
};

use core_types::BundleConfig;
use log::debug;
use time::{
    format_description::FormatItem, macros::format_description, OffsetDateTime, PrimitiveDateTime,
    UtcOffset,
};

use crate::error::BundleError;

/// File name of the daily store inside an ingestion directory.
pub const DAILY_STORE_FILE: &str = "daily.colstore";

const INGEST_DIR_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour];[minute];[second].[subsecond digits:6]"
);

/// Directory layout of one bundle: `<root>/<name>/<ingestion timestamp>/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleLayout {
    root: PathBuf,
    name: String,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    pub fn from_config(config: &BundleConfig) -> Self {
        Self::new(&config.root_dir, &config.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn ingest_dir(&self, timestamp: OffsetDateTime) -> PathBuf {
        self.bundle_dir().join(ingest_dirname(timestamp))
    }

    pub fn store_path(&self, timestamp: OffsetDateTime) -> PathBuf {
        self.ingest_dir(timestamp).join(DAILY_STORE_FILE)
    }

    /// Completed ingestions, oldest first. Hidden, unparsable and store-less entries are skipped.
    pub fn ingestions(&self) -> Result<Vec<(OffsetDateTime, PathBuf)>, BundleError> {
        let dir = self.bundle_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if is_hidden(&path) {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()).and_then(parse_ingest_dirname) {
                Some(ts) if path.join(DAILY_STORE_FILE).is_file() => found.push((ts, path)),
                Some(_) => debug!("skipping incomplete ingestion {:?} in bundle {}", path, self.name),
                None => debug!("skipping {:?} in bundle {}", path, self.name),
            }
        }
        found.sort();
        Ok(found)
    }

    /// Newest ingestion at or before `as_of` (now when `None`).
    pub fn most_recent(&self, as_of: Option<OffsetDateTime>) -> Result<PathBuf, BundleError> {
        let as_of = as_of.unwrap_or_else(OffsetDateTime::now_utc);
        self.ingestions()?
            .into_iter()
            .filter(|(ts, _)| *ts <= as_of)
            .last()
            .map(|(_, path)| path)
            .ok_or_else(|| BundleError::NoIngestions {
                bundle: self.name.clone(),
                as_of: as_of.to_string(),
            })
    }

    /// Store file of the newest ingestion at or before `as_of`.
    pub fn most_recent_store(&self, as_of: Option<OffsetDateTime>) -> Result<PathBuf, BundleError> {
        self.most_recent(as_of).map(|dir| dir.join(DAILY_STORE_FILE))
    }
}

/// ISO-8601 UTC instant with `:` replaced by `;`, safe as a directory name everywhere.
pub fn ingest_dirname(timestamp: OffsetDateTime) -> String {
    let utc = timestamp.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
        .format(INGEST_DIR_FORMAT)
        .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}

pub fn parse_ingest_dirname(name: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(name, INGEST_DIR_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn dirname_roundtrips_without_colons() {
        let ts = datetime!(2024-03-05 14:30:07.250 UTC);
        let name = ingest_dirname(ts);
        assert_eq!(name, "2024-03-05T14;30;07.250000");
        assert!(!name.contains(':'));
        assert_eq!(parse_ingest_dirname(&name), Some(ts));
        assert_eq!(parse_ingest_dirname("latest"), None);
    }

    #[test]
    fn most_recent_respects_as_of_and_hidden_entries() {
        let dir = tempdir().unwrap();
        let layout = BundleLayout::new(dir.path(), "sharadar");
        let older = datetime!(2024-01-01 00:00 UTC);
        let newer = datetime!(2024-02-01 00:00 UTC);
        for ts in [older, newer] {
            fs::create_dir_all(layout.ingest_dir(ts)).unwrap();
            fs::write(layout.store_path(ts), b"").unwrap();
        }
        fs::create_dir_all(layout.bundle_dir().join(".2024-03-01T00;00;00.000000")).unwrap();
        fs::create_dir_all(layout.bundle_dir().join("notes")).unwrap();

        assert_eq!(layout.most_recent(None).unwrap(), layout.ingest_dir(newer));
        assert_eq!(
            layout
                .most_recent(Some(datetime!(2024-01-15 00:00 UTC)))
                .unwrap(),
            layout.ingest_dir(older)
        );
        assert!(matches!(
            layout.most_recent(Some(datetime!(2023-12-31 00:00 UTC))),
            Err(BundleError::NoIngestions { .. })
        ));
        assert_eq!(
            layout.most_recent_store(None).unwrap(),
            layout.ingest_dir(newer).join(DAILY_STORE_FILE)
        );
    }

    #[test]
    fn ingestion_without_store_file_is_skipped() {
        let dir = tempdir().unwrap();
        let layout = BundleLayout::new(dir.path(), "sharadar");
        let good = datetime!(2024-02-01 00:00 UTC);
        let failed = datetime!(2024-03-01 00:00 UTC);
        fs::create_dir_all(layout.ingest_dir(good)).unwrap();
        fs::write(layout.store_path(good), b"").unwrap();
        fs::create_dir_all(layout.ingest_dir(failed)).unwrap();

        assert_eq!(layout.ingestions().unwrap().len(), 1);
        assert_eq!(layout.most_recent_store(None).unwrap(), layout.store_path(good));
    }

    #[test]
    fn missing_bundle_has_no_ingestions() {
        let dir = tempdir().unwrap();
        let layout = BundleLayout::new(dir.path(), "absent");
        assert!(layout.ingestions().unwrap().is_empty());
        assert!(matches!(
            layout.most_recent(None),
            Err(BundleError::NoIngestions { .. })
        ));
        assert!(is_hidden(Path::new("/x/.staging")));
    }
}

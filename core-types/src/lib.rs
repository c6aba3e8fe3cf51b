// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared identifiers, enums and bundle configuration for the daily column store.

pub mod config;
pub mod types;

pub use config::{BundleConfig, ConfigError};
pub use types::{AssetId, Encoding, InvalidDataBehavior, RESERVED_COLUMNS};

//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (DENORM_*)
//! 2. TOML config file (if DENORM_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::registry::options::{DEFAULT_ATTRIBUTE_PREFIX, DEFAULT_TIMESTAMP_SUFFIX};
use crate::registry::{RegistrationOptions, TriggerSpec};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (DENORM_*)
/// 2. TOML config file (if DENORM_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenormConfig {
    /// Path to the SQLite database.
    ///
    /// Set via DENORM_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Prefix that marks a field as denormalized.
    ///
    /// Set via DENORM_ATTRIBUTE_PREFIX environment variable.
    #[serde(default = "default_attribute_prefix")]
    pub attribute_prefix: String,

    /// Prefix of compute method names, `compute_` + attribute prefix when unset.
    ///
    /// Set via DENORM_COMPUTE_METHOD_PREFIX environment variable.
    #[serde(default)]
    pub compute_method_prefix: Option<String>,

    /// Suffix of denormalization timestamps.
    ///
    /// Set via DENORM_TIMESTAMP_SUFFIX environment variable.
    #[serde(default = "default_timestamp_suffix")]
    pub timestamp_suffix: String,

    /// Row limit for unset-value sweeps; unbounded when unset.
    ///
    /// Set via DENORM_SWEEP_LIMIT environment variable.
    #[serde(default)]
    pub sweep_limit: Option<usize>,

    /// Per-record-type settings keyed by record-type name.
    ///
    /// Set via DENORM_RECORD_TYPES__<TYPE>__<KEY> environment variables.
    /// Names are matched without regard to case, since environment keys are
    /// lowercased.
    #[serde(default)]
    pub record_types: BTreeMap<String, RecordTypeSettings>,
}

/// Settings for one record type. Unset prefixes fall back to the global ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeSettings {
    #[serde(default)]
    pub attribute_prefix: Option<String>,

    #[serde(default)]
    pub compute_method_prefix: Option<String>,

    #[serde(default)]
    pub timestamp_suffix: Option<String>,

    #[serde(default)]
    pub triggers_by_field: BTreeMap<String, TriggerSpec>,

    #[serde(default)]
    pub invalid_when_null_fields: BTreeSet<String>,

    #[serde(default)]
    pub defer_compute_check: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./denorm.sqlite")
}

fn default_attribute_prefix() -> String {
    DEFAULT_ATTRIBUTE_PREFIX.into()
}

fn default_timestamp_suffix() -> String {
    DEFAULT_TIMESTAMP_SUFFIX.into()
}

impl Default for DenormConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            attribute_prefix: default_attribute_prefix(),
            compute_method_prefix: None,
            timestamp_suffix: default_timestamp_suffix(),
            sweep_limit: None,
            record_types: BTreeMap::new(),
        }
    }
}

impl DenormConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `DENORM_`
    /// 2. TOML file from `DENORM_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("DENORM_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("DENORM_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Settings configured for a record type, if any.
    pub fn record_type(&self, record_type: &str) -> Option<&RecordTypeSettings> {
        self.record_types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(record_type))
            .map(|(_, settings)| settings)
    }

    /// Registration options for a record type: the global naming defaults
    /// overlaid with that type's settings.
    pub fn registration_options(&self, record_type: &str) -> RegistrationOptions {
        let global = RegistrationOptions {
            attribute_prefix: self.attribute_prefix.clone(),
            compute_method_prefix: self.compute_method_prefix.clone(),
            timestamp_suffix: self.timestamp_suffix.clone(),
            ..RegistrationOptions::default()
        };
        let Some(settings) = self.record_type(record_type) else {
            return global;
        };

        RegistrationOptions {
            attribute_prefix: settings.attribute_prefix.clone().unwrap_or(global.attribute_prefix),
            compute_method_prefix: settings
                .compute_method_prefix
                .clone()
                .or(global.compute_method_prefix),
            timestamp_suffix: settings.timestamp_suffix.clone().unwrap_or(global.timestamp_suffix),
            triggers_by_field: settings.triggers_by_field.clone(),
            invalid_when_null_fields: settings.invalid_when_null_fields.clone(),
            defer_compute_check: settings.defer_compute_check,
        }
    }
}

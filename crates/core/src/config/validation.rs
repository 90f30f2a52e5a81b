//! Configuration validation rules.
//!
//! This module provides validation logic for `DenormConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::DenormConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl DenormConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `attribute_prefix` or `timestamp_suffix` is empty, globally or for a record type
    /// - an explicit `compute_method_prefix` is empty
    /// - `sweep_limit` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attribute_prefix.is_empty() {
            return Err(invalid("attribute_prefix", "must not be empty"));
        }
        if self.timestamp_suffix.is_empty() {
            return Err(invalid("timestamp_suffix", "must not be empty"));
        }
        if self.compute_method_prefix.as_deref() == Some("") {
            return Err(invalid("compute_method_prefix", "must not be empty when set"));
        }
        if self.sweep_limit == Some(0) {
            return Err(invalid("sweep_limit", "must be greater than 0"));
        }

        for (record_type, settings) in &self.record_types {
            let field = |name: &str| format!("record_types.{record_type}.{name}");
            if settings.attribute_prefix.as_deref() == Some("") {
                return Err(invalid(field("attribute_prefix"), "must not be empty when set"));
            }
            if settings.timestamp_suffix.as_deref() == Some("") {
                return Err(invalid(field("timestamp_suffix"), "must not be empty when set"));
            }
            if settings.compute_method_prefix.as_deref() == Some("") {
                return Err(invalid(field("compute_method_prefix"), "must not be empty when set"));
            }

            if let Some(prefix) = settings.attribute_prefix.as_deref() {
                if prefix != self.attribute_prefix {
                    tracing::warn!(
                        record_type = %record_type,
                        prefix,
                        global = %self.attribute_prefix,
                        "record type overrides the global attribute prefix"
                    );
                }
            }
        }

        Ok(())
    }
}

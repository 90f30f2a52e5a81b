//! Per-record-type registration options.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::triggers::TriggerSpec;

pub const DEFAULT_ATTRIBUTE_PREFIX: &str = "denormalized_";
pub const DEFAULT_TIMESTAMP_SUFFIX: &str = "_computed_at";

/// Options accepted when registering a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOptions {
    /// Prefix that marks a field as denormalized.
    #[serde(default = "default_attribute_prefix")]
    pub attribute_prefix: String,

    /// Prefix of compute method names. Defaults to `compute_` + attribute prefix.
    #[serde(default)]
    pub compute_method_prefix: Option<String>,

    /// Suffix of the timestamp paired with a denormalized field.
    #[serde(default = "default_timestamp_suffix")]
    pub timestamp_suffix: String,

    /// Trigger rules keyed by denormalized attribute name.
    #[serde(default)]
    pub triggers_by_field: BTreeMap<String, TriggerSpec>,

    /// Fields whose null cached value always counts as stale.
    #[serde(default)]
    pub invalid_when_null_fields: BTreeSet<String>,

    /// Skip the registration-time compute function check and report missing
    /// functions when a recompute needs them.
    #[serde(default)]
    pub defer_compute_check: bool,
}

fn default_attribute_prefix() -> String {
    DEFAULT_ATTRIBUTE_PREFIX.into()
}

fn default_timestamp_suffix() -> String {
    DEFAULT_TIMESTAMP_SUFFIX.into()
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            attribute_prefix: default_attribute_prefix(),
            compute_method_prefix: None,
            timestamp_suffix: default_timestamp_suffix(),
            triggers_by_field: BTreeMap::new(),
            invalid_when_null_fields: BTreeSet::new(),
            defer_compute_check: false,
        }
    }
}

impl RegistrationOptions {
    pub fn resolved_compute_method_prefix(&self) -> String {
        self.compute_method_prefix
            .clone()
            .unwrap_or_else(|| format!("compute_{}", self.attribute_prefix))
    }

    pub fn trigger(mut self, field: impl Into<String>, spec: TriggerSpec) -> Self {
        self.triggers_by_field.insert(field.into(), spec);
        self
    }

    pub fn invalid_when_null(mut self, field: impl Into<String>) -> Self {
        self.invalid_when_null_fields.insert(field.into());
        self
    }
}

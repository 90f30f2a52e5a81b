//! Immutable per-record-type field metadata.

use std::collections::{BTreeMap, BTreeSet};

use super::options::RegistrationOptions;
use super::schema::TableSchema;
use super::triggers::Triggers;
use crate::value::Filter;

/// One denormalized field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub attribute_name: String,
    pub base_name: String,
    pub compute_method_name: String,
    /// Present only when the schema defines the paired timestamp column.
    pub timestamp_field_name: Option<String>,
    pub triggers: Triggers,
    pub invalid_when_null: bool,
}

/// Field registry entry for a record type.
///
/// Built once at registration and shared read-only by every instance.
#[derive(Debug, Clone)]
pub struct RecordTypeConfig {
    schema: TableSchema,
    attribute_prefix: String,
    compute_method_prefix: String,
    timestamp_suffix: String,
    fields: BTreeMap<String, FieldSpec>,
    timestamps: BTreeSet<String>,
}

impl RecordTypeConfig {
    /// Classify the schema's fields and resolve triggers.
    pub fn new(schema: TableSchema, options: &RegistrationOptions) -> Self {
        let mut config = Self {
            attribute_prefix: options.attribute_prefix.clone(),
            compute_method_prefix: options.resolved_compute_method_prefix(),
            timestamp_suffix: options.timestamp_suffix.clone(),
            fields: BTreeMap::new(),
            timestamps: BTreeSet::new(),
            schema,
        };

        config.timestamps = config
            .schema
            .fields
            .iter()
            .filter(|name| config.looks_like_timestamp(name))
            .cloned()
            .collect();

        let denormalized: Vec<String> = config
            .schema
            .fields
            .iter()
            .filter(|name| config.looks_like_denormalized(name))
            .cloned()
            .collect();

        for attribute_name in denormalized {
            let candidate = format!("{attribute_name}{}", config.timestamp_suffix);
            let spec = FieldSpec {
                base_name: config.base_name(&attribute_name).to_string(),
                compute_method_name: config.compute_method_name(&attribute_name),
                timestamp_field_name: config.schema.has_field(&candidate).then_some(candidate),
                triggers: Triggers::resolve(options.triggers_by_field.get(&attribute_name), &config.schema),
                invalid_when_null: options.invalid_when_null_fields.contains(&attribute_name),
                attribute_name: attribute_name.clone(),
            };
            config.fields.insert(attribute_name, spec);
        }

        for name in options
            .triggers_by_field
            .keys()
            .chain(options.invalid_when_null_fields.iter())
        {
            if !config.fields.contains_key(name) {
                tracing::warn!(
                    record_type = %config.schema.record_type,
                    field = %name,
                    "configured field is not a denormalized field; ignoring"
                );
            }
        }

        config
    }

    fn looks_like_timestamp(&self, name: &str) -> bool {
        name.len() > self.attribute_prefix.len() + self.timestamp_suffix.len()
            && name.starts_with(&self.attribute_prefix)
            && name.ends_with(&self.timestamp_suffix)
    }

    fn looks_like_denormalized(&self, name: &str) -> bool {
        name.len() > self.attribute_prefix.len()
            && name.starts_with(&self.attribute_prefix)
            && !self.looks_like_timestamp(name)
    }

    pub fn record_type(&self) -> &str {
        &self.schema.record_type
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn attribute_prefix(&self) -> &str {
        &self.attribute_prefix
    }

    pub fn compute_method_prefix(&self) -> &str {
        &self.compute_method_prefix
    }

    pub fn timestamp_suffix(&self) -> &str {
        &self.timestamp_suffix
    }

    /// Names of all denormalized fields, in name order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn field(&self, attribute_name: &str) -> Option<&FieldSpec> {
        self.fields.get(attribute_name)
    }

    /// Names of all denormalization timestamp fields, in name order.
    pub fn timestamp_field_names(&self) -> impl Iterator<Item = &str> {
        self.timestamps.iter().map(String::as_str)
    }

    pub fn is_denormalized_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_timestamp_field(&self, name: &str) -> bool {
        self.timestamps.contains(name)
    }

    /// Attribute name without the configured prefix.
    pub fn base_name<'a>(&self, attribute_name: &'a str) -> &'a str {
        attribute_name
            .strip_prefix(self.attribute_prefix.as_str())
            .unwrap_or(attribute_name)
    }

    pub fn attribute_name_from_base_name(&self, base_name: &str) -> String {
        format!("{}{base_name}", self.attribute_prefix)
    }

    pub fn compute_method_name(&self, attribute_name: &str) -> String {
        format!("{}{}", self.compute_method_prefix, self.base_name(attribute_name))
    }

    pub fn corresponding_timestamp(&self, attribute_name: &str) -> Option<&str> {
        self.fields
            .get(attribute_name)
            .and_then(|f| f.timestamp_field_name.as_deref())
    }

    pub fn has_timestamp(&self, attribute_name: &str) -> bool {
        self.corresponding_timestamp(attribute_name).is_some()
    }

    pub fn triggers(&self, attribute_name: &str) -> Option<&Triggers> {
        self.fields.get(attribute_name).map(|f| &f.triggers)
    }

    pub fn invalid_when_null(&self, attribute_name: &str) -> bool {
        self.fields.get(attribute_name).is_some_and(|f| f.invalid_when_null)
    }

    /// Rows with at least one null denormalization timestamp.
    ///
    /// A type without timestamp fields matches no rows.
    pub fn unset_filter(&self) -> Filter {
        Filter::any_null(self.timestamps.iter().cloned())
    }
}

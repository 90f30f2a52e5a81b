//! Field registry.
//!
//! A [`Registry`] is an explicit object owned by the application for its
//! whole lifetime. Each registered record type gets:
//!
//! - a [`RecordTypeConfig`] describing its denormalized fields, timestamps,
//!   and triggers, addressable by record-type name
//! - a typed [`Denormalizer`] pairing that config with one compute function
//!   per field
//!
//! Compute functions are checked when the type is registered unless the
//! options defer the check to recompute time.

pub mod config;
pub mod options;
pub mod schema;
pub mod triggers;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use config::{FieldSpec, RecordTypeConfig};
pub use options::RegistrationOptions;
pub use schema::{BelongsTo, HasMany, TableSchema};
pub use triggers::{TriggerSpec, Triggers};

use crate::config::DenormConfig;
use crate::error::{BoxError, Error};
use crate::record::Model;
use crate::value::Value;

/// Typed compute function for one denormalized field.
pub type ComputeFn<R> = Arc<dyn Fn(&R) -> Result<Value, BoxError> + Send + Sync>;

/// Builder for registering a record type.
pub struct Registration<R: Model> {
    schema: TableSchema,
    options: RegistrationOptions,
    computes: Vec<(String, ComputeFn<R>)>,
}

impl<R: Model> Registration<R> {
    pub fn new(schema: TableSchema) -> Self {
        Self { schema, options: RegistrationOptions::default(), computes: Vec::new() }
    }

    /// Start from the options configured for this record type.
    pub fn with_config(schema: TableSchema, config: &DenormConfig) -> Self {
        let options = config.registration_options(&schema.record_type);
        Self { schema, options, computes: Vec::new() }
    }

    pub fn options(mut self, options: RegistrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn trigger(mut self, field: &str, spec: TriggerSpec) -> Self {
        self.options = self.options.trigger(field, spec);
        self
    }

    pub fn invalid_when_null(mut self, field: &str) -> Self {
        self.options = self.options.invalid_when_null(field);
        self
    }

    pub fn defer_compute_check(mut self) -> Self {
        self.options.defer_compute_check = true;
        self
    }

    /// Attach the compute function of a field, named by attribute or base name.
    pub fn compute<F>(mut self, field: &str, compute: F) -> Self
    where
        F: Fn(&R) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.computes.push((field.to_string(), Arc::new(compute)));
        self
    }

    /// Classify fields, resolve triggers, and bind compute functions.
    pub fn build(self) -> Result<Denormalizer<R>, Error> {
        if self.schema.record_type != R::RECORD_TYPE {
            return Err(Error::RecordTypeMismatch(format!(
                "schema describes {} but the model is {}",
                self.schema.record_type,
                R::RECORD_TYPE
            )));
        }

        let config = RecordTypeConfig::new(self.schema, &self.options);
        let mut computes = HashMap::new();
        for (name, compute) in self.computes {
            let attribute_name = if config.is_denormalized_field(&name) {
                name
            } else {
                config.attribute_name_from_base_name(&name)
            };
            if !config.is_denormalized_field(&attribute_name) {
                tracing::warn!(
                    record_type = %config.record_type(),
                    field = %attribute_name,
                    "compute function for a field that is not denormalized; ignoring"
                );
                continue;
            }
            computes.insert(attribute_name, compute);
        }

        if !self.options.defer_compute_check {
            if let Some(missing) = config.fields().find(|f| !computes.contains_key(&f.attribute_name)) {
                return Err(Error::MissingComputeMethod {
                    method: missing.compute_method_name.clone(),
                    record_type: config.record_type().to_string(),
                });
            }
        }

        tracing::debug!(
            record_type = %config.record_type(),
            fields = config.fields().count(),
            timestamps = config.timestamp_field_names().count(),
            "registered denormalized record type"
        );

        Ok(Denormalizer { config: Arc::new(config), computes })
    }
}

/// Staleness, recompute, bulk, and lifecycle operations for one record type.
pub struct Denormalizer<R> {
    config: Arc<RecordTypeConfig>,
    computes: HashMap<String, ComputeFn<R>>,
}

impl<R> fmt::Debug for Denormalizer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut computes: Vec<&str> = self.computes.keys().map(String::as_str).collect();
        computes.sort_unstable();
        f.debug_struct("Denormalizer")
            .field("config", &self.config)
            .field("computes", &computes)
            .finish()
    }
}

impl<R> Denormalizer<R> {
    pub fn config(&self) -> &RecordTypeConfig {
        &self.config
    }

    pub(crate) fn compute_fn(&self, attribute_name: &str) -> Result<&ComputeFn<R>, Error> {
        self.computes
            .get(attribute_name)
            .ok_or_else(|| Error::MissingComputeMethod {
                method: self.config.compute_method_name(attribute_name),
                record_type: self.config.record_type().to_string(),
            })
    }
}

/// All record types known to the application.
#[derive(Default)]
pub struct Registry {
    configs: HashMap<String, Arc<RecordTypeConfig>>,
    denormalizers: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("record_types", &self.configs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type with its compute functions.
    pub fn register<R: Model>(&mut self, registration: Registration<R>) -> Result<Arc<Denormalizer<R>>, Error> {
        if self.is_registered(R::RECORD_TYPE) {
            return Err(Error::AlreadyRegistered(R::RECORD_TYPE.to_string()));
        }
        let denormalizer = Arc::new(registration.build()?);
        self.configs
            .insert(R::RECORD_TYPE.to_string(), Arc::clone(&denormalizer.config));
        self.denormalizers
            .insert(R::RECORD_TYPE.to_string(), denormalizer.clone() as Arc<dyn Any + Send + Sync>);
        Ok(denormalizer)
    }

    /// Register only the field layout of a record type.
    ///
    /// Enough for field queries and bulk unsets; recomputation needs
    /// [`Registry::register`].
    pub fn register_schema(
        &mut self, schema: TableSchema, options: &RegistrationOptions,
    ) -> Result<Arc<RecordTypeConfig>, Error> {
        if self.is_registered(&schema.record_type) {
            return Err(Error::AlreadyRegistered(schema.record_type));
        }
        let record_type = schema.record_type.clone();
        let config = Arc::new(RecordTypeConfig::new(schema, options));
        self.configs.insert(record_type, Arc::clone(&config));
        Ok(config)
    }

    pub fn is_registered(&self, record_type: &str) -> bool {
        self.configs.contains_key(record_type)
    }

    pub fn record_types(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn config(&self, record_type: &str) -> Result<&Arc<RecordTypeConfig>, Error> {
        self.configs
            .get(record_type)
            .ok_or_else(|| Error::UnknownRecordType(record_type.to_string()))
    }

    pub fn denormalizer<R: Model>(&self) -> Result<Arc<Denormalizer<R>>, Error> {
        let entry = self
            .denormalizers
            .get(R::RECORD_TYPE)
            .ok_or_else(|| Error::UnknownRecordType(R::RECORD_TYPE.to_string()))?;
        Arc::clone(entry)
            .downcast::<Denormalizer<R>>()
            .map_err(|_| Error::RecordTypeMismatch(R::RECORD_TYPE.to_string()))
    }

    /// False for unregistered record types.
    pub fn is_denormalized_field(&self, record_type: &str, name: &str) -> bool {
        self.configs
            .get(record_type)
            .is_some_and(|c| c.is_denormalized_field(name))
    }

    /// False for unregistered record types.
    pub fn is_timestamp_field(&self, record_type: &str, name: &str) -> bool {
        self.configs
            .get(record_type)
            .is_some_and(|c| c.is_timestamp_field(name))
    }
}

//! Per-record recomputation.
//!
//! Recomputing a field calls its compute function, writes the value, and
//! stamps the paired timestamp with the current time. A [`PersistCycle`]
//! remembers which fields were already recomputed during one save pass so
//! repeated calls in the same pass do not compute twice.

use std::collections::BTreeSet;

use chrono::Utc;

use crate::error::Error;
use crate::record::Model;
use crate::registry::Denormalizer;
use crate::value::Value;

/// Fields recomputed during the current save pass.
///
/// Owned by the caller of the lifecycle hooks and cleared after persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistCycle {
    recomputed: BTreeSet<String>,
}

impl PersistCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, attribute_name: &str) -> bool {
        self.recomputed.contains(attribute_name)
    }

    pub fn recomputed(&self) -> impl Iterator<Item = &str> {
        self.recomputed.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.recomputed.is_empty()
    }

    pub(crate) fn mark(&mut self, attribute_name: &str) {
        self.recomputed.insert(attribute_name.to_string());
    }

    /// Allow the field to be recomputed again in this pass.
    pub fn forget(&mut self, attribute_name: &str) {
        self.recomputed.remove(attribute_name);
    }

    pub fn clear(&mut self) {
        self.recomputed.clear();
    }
}

impl<R: Model> Denormalizer<R> {
    /// Recompute every field that is unset or stale, or every field when
    /// `force_all` is set.
    ///
    /// Returns the number of fields actually recomputed.
    pub fn recompute_if_needed(&self, record: &mut R, cycle: &mut PersistCycle, force_all: bool) -> Result<usize, Error> {
        let current: &R = record;
        let pending: Vec<String> = self
            .config()
            .field_names()
            .filter(|name| force_all || self.is_unset(current, name) || self.is_stale(current, name))
            .map(str::to_string)
            .collect();

        let mut recomputed = 0;
        for attribute_name in &pending {
            if self.compute_field(record, attribute_name, cycle)? {
                recomputed += 1;
            }
        }
        Ok(recomputed)
    }

    /// Recompute one field unless it was already recomputed in this cycle.
    ///
    /// Returns whether the compute function ran. Names that are not
    /// denormalized fields are ignored.
    pub fn compute_field(&self, record: &mut R, attribute_name: &str, cycle: &mut PersistCycle) -> Result<bool, Error> {
        let config = self.config();
        if !config.is_denormalized_field(attribute_name) {
            return Ok(false);
        }
        let compute = self.compute_fn(attribute_name)?;
        if cycle.contains(attribute_name) {
            tracing::debug!(
                record_type = %config.record_type(),
                field = %attribute_name,
                "already recomputed in this cycle"
            );
            return Ok(false);
        }

        let value = compute(&*record).map_err(|source| Error::Compute { field: attribute_name.to_string(), source })?;
        record.set(attribute_name, value);
        if let Some(stamp) = config.corresponding_timestamp(attribute_name) {
            record.set(stamp, Value::Timestamp(Utc::now()));
        }
        cycle.mark(attribute_name);

        tracing::debug!(record_type = %config.record_type(), field = %attribute_name, "recomputed denormalized value");
        Ok(true)
    }

    /// Compute a field's value without writing it to the record.
    pub fn compute_value(&self, record: &R, attribute_name: &str) -> Result<Value, Error> {
        let compute = self.compute_fn(attribute_name)?;
        compute(record).map_err(|source| Error::Compute { field: attribute_name.to_string(), source })
    }

    /// Read-through accessor: the cached value when usable, otherwise a
    /// fresh computation that is not written back.
    pub fn read(&self, record: &R, attribute_name: &str) -> Result<Value, Error> {
        let config = self.config();
        if !config.is_denormalized_field(attribute_name) {
            return Err(Error::UnknownField {
                record_type: config.record_type().to_string(),
                field: attribute_name.to_string(),
            });
        }
        if self.is_usable(record, attribute_name) {
            Ok(record.get(attribute_name))
        } else {
            self.compute_value(record, attribute_name)
        }
    }

    /// [`Denormalizer::read`] addressed by base name, e.g. `user_name`.
    pub fn read_base(&self, record: &R, base_name: &str) -> Result<Value, Error> {
        let attribute_name = self.config().attribute_name_from_base_name(base_name);
        self.read(record, &attribute_name)
    }

    /// Null a field and its timestamp in memory.
    pub fn unset(&self, record: &mut R, attribute_name: &str, cycle: &mut PersistCycle) {
        record.set(attribute_name, Value::Null);
        if let Some(stamp) = self.config().corresponding_timestamp(attribute_name) {
            record.set(stamp, Value::Null);
        }
        cycle.forget(attribute_name);
    }

    /// Unset the named fields; an empty list unsets every denormalized field.
    pub fn unset_fields(&self, record: &mut R, attribute_names: &[&str], cycle: &mut PersistCycle) {
        if attribute_names.is_empty() {
            self.unset_all(record, cycle);
            return;
        }
        for attribute_name in attribute_names {
            self.unset(record, attribute_name, cycle);
        }
    }

    pub fn unset_all(&self, record: &mut R, cycle: &mut PersistCycle) {
        let names: Vec<String> = self.config().field_names().map(str::to_string).collect();
        for attribute_name in &names {
            self.unset(record, attribute_name, cycle);
        }
    }

    /// Unset every field that is currently stale.
    pub fn unset_stale(&self, record: &mut R, cycle: &mut PersistCycle) {
        for attribute_name in self.config().stale_fields(record) {
            self.unset(record, &attribute_name, cycle);
        }
    }
}

//! Bulk operations.
//!
//! These write straight to a [`Storage`] collaborator and skip the
//! per-record lifecycle hooks. They are meant for maintenance sweeps and
//! for invalidating cached values when a related record changed out of
//! band.

use std::collections::BTreeSet;

use chrono::Utc;

use crate::config::DenormConfig;
use crate::engine::PersistCycle;
use crate::error::Error;
use crate::record::Model;
use crate::registry::{Denormalizer, RecordTypeConfig, Registry};
use crate::store::Storage;
use crate::value::{Filter, Row, Value};

impl RecordTypeConfig {
    /// Null the named fields and their timestamps on every row matching
    /// `filter`.
    ///
    /// Names the table does not define are dropped. No request is issued
    /// when nothing is left. Returns the number of rows updated.
    pub async fn unset_for_all<S, I, N>(&self, store: &S, attribute_names: I, filter: &Filter) -> Result<u64, Error>
    where
        S: Storage + ?Sized,
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut names = BTreeSet::new();
        for name in attribute_names {
            let name = name.as_ref();
            if let Some(stamp) = self.corresponding_timestamp(name) {
                names.insert(stamp.to_string());
            }
            names.insert(name.to_string());
        }

        let values: Row = names
            .into_iter()
            .filter(|name| self.schema().has_field(name))
            .map(|name| (name, Value::Null))
            .collect();
        if values.is_empty() {
            tracing::debug!(record_type = %self.record_type(), "no known fields to unset");
            return Ok(0);
        }

        let updated = store.update_matching(self.table(), &values, filter).await?;
        tracing::info!(
            record_type = %self.record_type(),
            fields = values.len(),
            updated,
            "unset denormalized values"
        );
        Ok(updated)
    }
}

impl Registry {
    /// [`RecordTypeConfig::unset_for_all`] addressed by record-type name.
    pub async fn unset_for_all<S, I, N>(
        &self, store: &S, record_type: &str, attribute_names: I, filter: &Filter,
    ) -> Result<u64, Error>
    where
        S: Storage + ?Sized,
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        self.config(record_type)?
            .unset_for_all(store, attribute_names, filter)
            .await
    }
}

impl<R: Model> Denormalizer<R> {
    /// Rows with at least one unset value.
    pub fn unset_filter(&self) -> Filter {
        self.config().unset_filter()
    }

    fn key_filter(&self, record: &R) -> Result<Filter, Error> {
        let config = self.config();
        let key = record
            .key()
            .ok_or_else(|| Error::MissingKey(config.record_type().to_string()))?;
        Ok(Filter::Eq(config.schema().primary_key.clone(), key))
    }

    /// Recompute unset or stale fields and write them with one direct row
    /// update, bypassing the lifecycle hooks.
    ///
    /// `attribute_names` defaults to every denormalized field. New records
    /// are left alone. Computed values are also written to the record.
    /// Returns the number of fields recomputed.
    pub async fn recompute_via_bulk_path<S: Storage + ?Sized>(
        &self, record: &mut R, store: &S, attribute_names: Option<&[&str]>,
    ) -> Result<usize, Error> {
        if record.is_new() {
            return Ok(0);
        }
        let config = self.config();
        let filter = self.key_filter(record)?;

        let requested: Vec<String> = match attribute_names {
            Some(names) => names.iter().map(|n| (*n).to_string()).collect(),
            None => config.field_names().map(str::to_string).collect(),
        };
        let current: &R = record;
        let pending: Vec<String> = requested
            .into_iter()
            .filter(|name| self.is_unset(current, name) || self.is_stale(current, name))
            .collect();

        let now = Value::Timestamp(Utc::now());
        let mut updates = Row::new();
        for attribute_name in &pending {
            let value = self.compute_value(record, attribute_name)?;
            record.set(attribute_name, value.clone());
            updates.insert(attribute_name.clone(), value);
            if let Some(stamp) = config.corresponding_timestamp(attribute_name) {
                record.set(stamp, now.clone());
                updates.insert(stamp.to_string(), now.clone());
            }
        }
        if updates.is_empty() {
            return Ok(0);
        }

        for (field, value) in &mut updates {
            if config.schema().is_serialized(field) {
                *value = value.to_serialized()?;
            }
        }

        store.update_matching(config.table(), &updates, &filter).await?;
        tracing::debug!(
            record_type = %config.record_type(),
            fields = pending.len(),
            "recomputed via bulk path"
        );
        Ok(pending.len())
    }

    /// Null the named fields of this record's row in storage.
    ///
    /// The in-memory record is not modified; the names are forgotten from
    /// the cycle so a later pass recomputes them.
    pub async fn unset_via_bulk_path<S: Storage + ?Sized>(
        &self, record: &R, attribute_names: &[&str], store: &S, cycle: &mut PersistCycle,
    ) -> Result<u64, Error> {
        let filter = self.key_filter(record)?;
        let updated = self
            .config()
            .unset_for_all(store, attribute_names.iter().copied(), &filter)
            .await?;
        for attribute_name in attribute_names {
            cycle.forget(attribute_name);
        }
        Ok(updated)
    }

    pub async fn unset_all_via_bulk_path<S: Storage + ?Sized>(
        &self, record: &R, store: &S, cycle: &mut PersistCycle,
    ) -> Result<u64, Error> {
        let names: Vec<&str> = self.config().field_names().collect();
        self.unset_via_bulk_path(record, &names, store, cycle).await
    }

    /// Unset every field in memory, then recompute all of them through the
    /// bulk path.
    pub async fn recompute<S: Storage + ?Sized>(
        &self, record: &mut R, store: &S, cycle: &mut PersistCycle,
    ) -> Result<usize, Error> {
        self.unset_all(record, cycle);
        self.recompute_via_bulk_path(record, store, None).await
    }

    /// Recompute every row with an unset value, up to `limit` rows.
    ///
    /// Rows are rebuilt with [`Model::from_row`]. Returns the number of rows
    /// that had at least one field recomputed.
    pub async fn recompute_all_unset<S: Storage + ?Sized>(&self, store: &S, limit: Option<usize>) -> Result<usize, Error> {
        self.recompute_all_unset_with(store, limit, R::from_row).await
    }

    /// [`Denormalizer::recompute_all_unset`] bounded by the configured
    /// `sweep_limit`.
    pub async fn recompute_all_unset_configured<S: Storage + ?Sized>(
        &self, store: &S, config: &DenormConfig,
    ) -> Result<usize, Error> {
        self.recompute_all_unset(store, config.sweep_limit).await
    }

    /// [`Denormalizer::recompute_all_unset`] with a caller-supplied loader,
    /// for compute functions that read associations a bare row lacks.
    pub async fn recompute_all_unset_with<S, F>(&self, store: &S, limit: Option<usize>, hydrate: F) -> Result<usize, Error>
    where
        S: Storage + ?Sized,
        F: Fn(Row) -> Result<R, Error>,
    {
        let config = self.config();
        let rows = store
            .select_matching(config.table(), &self.unset_filter(), limit)
            .await?;
        let selected = rows.len();

        let mut recomputed = 0;
        for row in rows {
            let mut record = hydrate(row)?;
            if self.recompute_via_bulk_path(&mut record, store, None).await? > 0 {
                recomputed += 1;
            }
        }

        tracing::info!(
            record_type = %config.record_type(),
            selected,
            recomputed,
            limit = ?limit,
            "recomputed unset denormalized values"
        );
        Ok(recomputed)
    }
}

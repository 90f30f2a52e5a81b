//! The record contract the mapping layer provides.
//!
//! [`Record`] is object safe so related records can be traversed as
//! `&dyn Record`. [`Model`] adds what the registry needs to address a
//! concrete record type and rebuild instances from stored rows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::Error;
use crate::value::{Row, Value};

/// A mapped record instance with change tracking.
pub trait Record {
    /// Current value of a named attribute; unknown attributes read as null.
    fn get(&self, field: &str) -> Value;

    fn set(&mut self, field: &str, value: Value);

    /// Attributes whose value differs from the last persisted state.
    fn changed_fields(&self) -> BTreeSet<String>;

    fn has_changes(&self) -> bool {
        !self.changed_fields().is_empty()
    }

    /// True until the instance has been persisted once.
    fn is_new(&self) -> bool;

    /// Primary key value, once persisted.
    fn key(&self) -> Option<Value>;

    /// Last-modified timestamp of the persisted row.
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// The related record behind a many-to-one or one-to-one association.
    fn related(&self, _association: &str) -> Option<&dyn Record> {
        None
    }

    /// Members of a one-to-many association.
    fn related_many(&self, _association: &str) -> Vec<&dyn Record> {
        Vec::new()
    }
}

/// A concrete record type that can be registered for denormalization.
pub trait Model: Record + Sized + Send + 'static {
    /// Name the record type is registered under.
    const RECORD_TYPE: &'static str;

    /// Rebuild a persisted instance from a stored row.
    fn from_row(row: Row) -> Result<Self, Error>;
}

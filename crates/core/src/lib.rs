//! Denormalized-value cache overlay for records backed by a relational store.
//!
//! Record types register fields that hold precomputed values, each paired
//! with an optional `<field>_computed_at` timestamp. This crate provides:
//! - A field registry with naming conventions, triggers, and typed compute functions
//! - Staleness rules driven by field-level change tracking
//! - Recomputation around the persist lifecycle, at most once per field per save pass
//! - Bulk unset and recompute through a storage collaborator, bypassing hooks
//! - Memory and SQLite storage backends
//! - Layered configuration and a unified error type

pub mod bulk;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod record;
pub mod registry;
pub mod staleness;
pub mod store;
pub mod value;

#[cfg(test)]
mod test_fixtures;

pub use config::{ConfigError, DenormConfig, RecordTypeSettings};
pub use engine::PersistCycle;
pub use error::{BoxError, Error};
pub use hooks::PersistHooks;
pub use record::{Model, Record};
pub use registry::{
    ComputeFn, Denormalizer, RecordTypeConfig, Registration, RegistrationOptions, Registry, TableSchema, TriggerSpec,
};
pub use store::{MemoryStore, Migration, SqliteStore, Storage};
pub use value::{Filter, Row, Value};

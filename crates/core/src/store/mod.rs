//! Storage collaborators.
//!
//! The core never executes SQL itself. Bulk operations go through the
//! [`Storage`] trait, implemented here by:
//!
//! - [`MemoryStore`]: in-process tables, used by tests and embedders
//! - [`SqliteStore`]: SQLite via tokio-rusqlite, with WAL mode and
//!   caller-supplied schema migrations

pub mod memory;
pub mod sqlite;

use std::collections::BTreeSet;

pub use memory::MemoryStore;
pub use sqlite::{Migration, SqliteStore};

use crate::Error;
use crate::value::{Filter, Row};

/// Direct row access that bypasses per-record lifecycle hooks.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Set each named field to its value on every row matching the filter.
    ///
    /// Returns the number of rows updated.
    async fn update_matching(&self, table: &str, values: &Row, filter: &Filter) -> Result<u64, Error>;

    /// Rows matching the filter, up to `limit` when given.
    async fn select_matching(&self, table: &str, filter: &Filter, limit: Option<usize>) -> Result<Vec<Row>, Error>;

    /// Column names of a table.
    async fn field_names(&self, table: &str) -> Result<BTreeSet<String>, Error>;
}

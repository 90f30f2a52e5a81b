//! SQLite storage backend with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), and running the caller's
//! schema migrations.

mod migrations;
mod sql;

use std::collections::BTreeSet;
use std::path::Path;

use tokio_rusqlite::rusqlite::params_from_iter;
use tokio_rusqlite::{Connection, params};

pub use migrations::Migration;

use super::Storage;
use crate::Error;
use crate::config::DenormConfig;
use crate::value::{Filter, Row};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// SQLite database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pub(crate) conn: Connection,
}

impl SqliteStore {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>, migrations: &[Migration]) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn, migrations).await
    }

    /// Open the database at the configured `db_path`.
    pub async fn open_configured(config: &DenormConfig, migrations: &[Migration]) -> Result<Self, Error> {
        tracing::debug!(path = %config.db_path.display(), "opening denormalization store");
        Self::open(&config.db_path, migrations).await
    }

    /// Open an in-memory database with the same pragma configuration as
    /// file-based databases.
    pub async fn open_in_memory(migrations: &[Migration]) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn, migrations).await
    }

    async fn prepare(conn: Connection, migrations: &[Migration]) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn, migrations).await?;

        Ok(Self { conn })
    }

    /// Insert a row through the normal write path.
    pub async fn insert(&self, table: &str, row: &Row) -> Result<(), Error> {
        let (sql, params) = sql::insert_statement(table, row)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(&sql, params_from_iter(params.iter()))?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait::async_trait]
impl Storage for SqliteStore {
    async fn update_matching(&self, table: &str, values: &Row, filter: &Filter) -> Result<u64, Error> {
        if values.is_empty() {
            return Ok(0);
        }
        let (sql, params) = sql::update_statement(table, values, filter)?;
        let updated = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let updated = conn.execute(&sql, params_from_iter(params.iter()))?;
                Ok(updated)
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(table, updated, "bulk update");
        Ok(updated as u64)
    }

    async fn select_matching(&self, table: &str, filter: &Filter, limit: Option<usize>) -> Result<Vec<Row>, Error> {
        let (sql, params) = sql::select_statement(table, filter, limit)?;
        self.conn
            .call(move |conn| -> Result<Vec<Row>, Error> {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| sql::read_row(row, &columns))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    async fn field_names(&self, table: &str) -> Result<BTreeSet<String>, Error> {
        let name = table.to_string();
        let fields = self
            .conn
            .call(move |conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
                let fields = stmt
                    .query_map(params![name], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(fields)
            })
            .await
            .map_err(Error::from)?;

        if fields.is_empty() {
            return Err(Error::UnknownTable(table.to_string()));
        }
        Ok(fields)
    }
}

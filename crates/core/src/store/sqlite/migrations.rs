//! Schema migrations for SQLite-backed record tables.
//!
//! Uses a simple version table approach to track applied migrations.
//! Each migration is a SQL batch supplied by the application.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// A versioned schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: i64, description: &'static str, sql: &'static str) -> Self {
        Self { version, description, sql }
    }
}

/// Run any pending migrations.
///
/// Creates the `_migrations` table if it doesn't exist, checks the current
/// version, and applies migrations with a higher version in order.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute or versions are not
/// strictly increasing.
pub async fn run(conn: &Connection, migrations: &[Migration]) -> Result<(), Error> {
    let migrations = migrations.to_vec();
    if migrations.windows(2).any(|pair| pair[0].version >= pair[1].version) {
        return Err(Error::MigrationFailed("migration versions must be strictly increasing".into()));
    }

    conn.call(move |conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
                row.get(0)
            })
            .map_err(Error::from)?;

        for migration in &migrations {
            if migration.version > current {
                conn.execute_batch(migration.sql)
                    .map_err(|e| Error::MigrationFailed(format!("{}: {e}", migration.description)))?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![migration.version, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(Error::from)?;
                tracing::debug!(version = migration.version, description = migration.description, "applied migration");
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

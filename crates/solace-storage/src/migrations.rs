//! Versioned schema migrations.
//!
//! Each migration runs once, inside a transaction, and is recorded in the
//! `schema_migrations` table.

use rusqlite::Connection;
use tracing::info;

use solace_core::error::SolaceError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// `created_at` holds epoch milliseconds; rowid breaks ties between the user
/// and bot halves of an exchange written in the same millisecond.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "transcript_messages",
    sql: "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT,
            sender      TEXT NOT NULL CHECK (sender IN ('user', 'bot')),
            text        TEXT NOT NULL,
            emotion     TEXT,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_user_created
            ON messages (user_id, created_at ASC);
    ",
}];

/// Highest version recorded in `schema_migrations`, 0 when none.
pub fn current_version(conn: &Connection) -> Result<i64, SolaceError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| SolaceError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Bring the schema up to the latest version.
pub fn run_migrations(conn: &Connection) -> Result<(), SolaceError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| SolaceError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let applied = current_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), SolaceError> {
    let fail = |e: rusqlite::Error| {
        SolaceError::Storage(format!("Migration v{} failed: {}", migration.version, e))
    };
    let tx = conn.unchecked_transaction().map_err(fail)?;
    tx.execute_batch(migration.sql).map_err(fail)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.name],
    )
    .map_err(fail)?;
    tx.commit().map_err(fail)
}

//! Database Migrations
//!
//! Schema migration definitions for the storage layer. Versions are
//! tracked in `PRAGMA user_version` and applied in order inside a single
//! transaction each.

use rusqlite::Connection;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: namespaced memories with optional vector ids",
    up: MIGRATION_V1_UP,
}];

/// V1: the memories table
///
/// `timestamp` is seconds since the epoch and drives recency ordering;
/// `vector_id` links into the in-memory vector index and may dangle after
/// an index loss without corrupting the record.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    timestamp REAL NOT NULL,
    vector_id INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_memories_namespace_timestamp
    ON memories(namespace, timestamp DESC);
"#;

/// Apply all pending migrations to the connection
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        let tx_sql = format!(
            "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration.up, migration.version
        );
        conn.execute_batch(&tx_sql)?;
    }

    Ok(())
}

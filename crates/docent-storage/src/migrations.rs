//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use docent_core::error::DocentError;

/// Run all pending database migrations.
///
/// Future migrations can be added by checking the current version and
/// applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), DocentError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| DocentError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DocentError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: chunks");
    }

    Ok(())
}

/// Version 1: chunk table.
///
/// Embeddings are stored as little-endian f32 BLOBs; `created_at` is in
/// Unix milliseconds.
fn apply_v1(conn: &Connection) -> Result<(), DocentError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chunks (
            id              TEXT PRIMARY KEY NOT NULL,
            document_id     TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL CHECK (chunk_index >= 0),
            content         TEXT NOT NULL,
            embedding       BLOB NOT NULL,
            created_at      INTEGER NOT NULL,
            UNIQUE (document_id, chunk_index)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document
            ON chunks (document_id, chunk_index);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'chunks');
        ",
    )
    .map_err(|e| DocentError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}

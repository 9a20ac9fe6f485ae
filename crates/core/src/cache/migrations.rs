//! Database schema migrations.
//!
//! Uses a version table to track applied migrations.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// (version, name, SQL), ascending by version.
///
/// Every statement uses CREATE ... IF NOT EXISTS.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "stores", include_str!("../../migrations/001_stores.sql")),
    (2, "sync_obligations", include_str!("../../migrations/002_sync_obligations.sql")),
];

/// Apply every migration newer than the recorded schema version.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        let tx = conn.transaction()?;
        for &(version, name, sql) in MIGRATIONS.iter().filter(|(version, _, _)| *version > current) {
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version} ({name}): {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![version, name, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version, name, "applied cache migration");
        }
        tx.commit()?;

        Ok(())
    })
    .await
    .map_err(Error::from)
}

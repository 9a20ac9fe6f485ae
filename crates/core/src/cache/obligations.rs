//! Deferred-sync obligation persistence.
//!
//! An obligation is a tag naming a resource to re-fetch once connectivity
//! returns. Registration is idempotent; a successful re-fetch discharges it.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A pending re-fetch obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncObligation {
    pub tag: String,
    /// Path (relative to the application origin) to re-fetch.
    pub resource: String,
    pub registered_at: String,
    /// Failed discharge attempts so far.
    pub attempts: i64,
    pub last_error: Option<String>,
}

fn decode_obligation(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncObligation> {
    Ok(SyncObligation {
        tag: row.get(0)?,
        resource: row.get(1)?,
        registered_at: row.get(2)?,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
    })
}

impl CacheDb {
    /// Register an obligation.
    ///
    /// Returns false when the tag is already pending; the existing obligation is
    /// left untouched.
    pub async fn register_obligation(&self, tag: &str, resource: &str) -> Result<bool, Error> {
        let tag = tag.to_string();
        let resource = resource.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO sync_obligations (tag, resource, registered_at) VALUES (?1, ?2, ?3)",
                    params![tag, resource, now],
                )?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn get_obligation(&self, tag: &str) -> Result<Option<SyncObligation>, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<Option<SyncObligation>, Error> {
                let result = conn.query_row(
                    "SELECT tag, resource, registered_at, attempts, last_error
                     FROM sync_obligations WHERE tag = ?1",
                    params![tag],
                    decode_obligation,
                );

                match result {
                    Ok(o) => Ok(Some(o)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All pending obligations, oldest first.
    pub async fn pending_obligations(&self) -> Result<Vec<SyncObligation>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<SyncObligation>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT tag, resource, registered_at, attempts, last_error
                     FROM sync_obligations ORDER BY registered_at, tag",
                )?;
                let pending = stmt
                    .query_map([], decode_obligation)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(pending)
            })
            .await
            .map_err(Error::from)
    }

    /// Record a failed discharge attempt. The obligation stays pending.
    pub async fn record_obligation_failure(&self, tag: &str, error: &str) -> Result<(), Error> {
        let tag = tag.to_string();
        let error = error.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE sync_obligations SET attempts = attempts + 1, last_error = ?2 WHERE tag = ?1",
                    params![tag, error],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an obligation. Returns false if it wasn't pending.
    pub async fn discharge_obligation(&self, tag: &str) -> Result<bool, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM sync_obligations WHERE tag = ?1", params![tag])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

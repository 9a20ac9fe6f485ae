//! Store-level operations: open, enumerate, size, delete.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Create a store if it doesn't exist yet. Opening a live store is a no-op.
    pub async fn open_store(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all live stores, in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry count per live store. Empty stores report zero.
    pub async fn store_sizes(&self) -> Result<BTreeMap<String, u64>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeMap<String, u64>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT s.name, COUNT(e.key_hash)
                     FROM stores s LEFT JOIN entries e ON e.store = s.name
                     GROUP BY s.name",
                )?;
                let sizes = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(sizes)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and every entry in it.
    ///
    /// Returns false if no such store was live. A concurrent lookup against the
    /// store either completes before the delete or observes a miss.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every store regardless of version.
    ///
    /// Returns the number of stores removed.
    pub async fn delete_all_stores(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries", [])?;
                let deleted = tx.execute("DELETE FROM stores", [])?;
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("static-v1").await.unwrap();
        db.open_store("static-v1").await.unwrap();
        assert_eq!(db.store_names().await.unwrap(), vec!["static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_store_names_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for name in ["static-v1", "api-v1", "general-v1"] {
            db.open_store(name).await.unwrap();
        }
        assert_eq!(db.store_names().await.unwrap(), vec!["static-v1", "api-v1", "general-v1"]);
    }

    #[tokio::test]
    async fn test_store_sizes_reports_empty_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("api-v1").await.unwrap();
        let sizes = db.store_sizes().await.unwrap();
        assert_eq!(sizes.get("api-v1"), Some(&0));
    }

    #[tokio::test]
    async fn test_delete_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("static-v1").await.unwrap();
        assert!(db.delete_store("static-v1").await.unwrap());
        assert!(!db.delete_store("static-v1").await.unwrap());
        assert!(!db.has_store("static-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("a").await.unwrap();
        db.open_store("b").await.unwrap();
        assert_eq!(db.delete_all_stores().await.unwrap(), 2);
        assert!(db.store_names().await.unwrap().is_empty());
        assert_eq!(db.delete_all_stores().await.unwrap(), 0);
    }
}

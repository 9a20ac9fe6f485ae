//! Entry-level operations: put, match, delete, enumerate.
//!
//! Writes add or replace exactly one entry keyed by the triggering request in
//! exactly one named store. Writing to a store that isn't live opens it first,
//! matching how a store is implicitly created on first use.

use std::collections::BTreeMap;

use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use crate::Error;
use crate::model::{RequestDescriptor, ResponseArtifact};

/// A stored response together with where and when it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub store: String,
    pub method: String,
    pub url: String,
    pub response: ResponseArtifact,
    pub cached_at: String,
}

/// Owned row data ready to cross into the connection thread.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(request: &RequestDescriptor, response: &ResponseArtifact) -> Result<Self, Error> {
        Ok(Self {
            key_hash: request.cache_key(),
            method: request.method().to_string(),
            url: request.url().to_string(),
            status: response.status,
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

fn insert_rows(conn: &mut rusqlite::Connection, store: &str, rows: &[EntryRow]) -> Result<(), Error> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    tx.execute("INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)", params![store, now])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO entries (store, key_hash, method, url, status, headers_json, body, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(store, key_hash) DO UPDATE SET
                method = excluded.method,
                url = excluded.url,
                status = excluded.status,
                headers_json = excluded.headers_json,
                body = excluded.body,
                cached_at = excluded.cached_at",
        )?;
        for row in rows {
            stmt.execute(params![
                store,
                &row.key_hash,
                &row.method,
                &row.url,
                row.status,
                &row.headers_json,
                &row.body,
                &now
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// store, method, url, status, headers_json, body, cached_at
type RawEntry = (String, String, String, u16, String, Vec<u8>, String);

fn decode_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?))
}

fn into_entry((store, method, url, status, headers_json, body, cached_at): RawEntry) -> Result<CachedEntry, Error> {
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
    let response = ResponseArtifact { status, headers, body: Bytes::from(body) };
    Ok(CachedEntry { store, method, url, response, cached_at })
}

impl CacheDb {
    /// Insert or replace the entry for `request` in `store`.
    pub async fn put(&self, store: &str, request: &RequestDescriptor, response: &ResponseArtifact) -> Result<(), Error> {
        let store = store.to_string();
        let row = EntryRow::new(request, response)?;
        self.conn
            .call(move |conn| insert_rows(conn, &store, std::slice::from_ref(&row)))
            .await
            .map_err(Error::from)
    }

    /// Insert or replace many entries in one transaction: all land or none do.
    pub async fn put_all(&self, store: &str, entries: &[(RequestDescriptor, ResponseArtifact)]) -> Result<(), Error> {
        let store = store.to_string();
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        self.conn
            .call(move |conn| insert_rows(conn, &store, &rows))
            .await
            .map_err(Error::from)
    }

    /// Exact-key lookup in one store.
    pub async fn match_in(&self, store: &str, request: &RequestDescriptor) -> Result<Option<CachedEntry>, Error> {
        let store = store.to_string();
        let key_hash = request.cache_key();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let result = conn.query_row(
                    "SELECT store, method, url, status, headers_json, body, cached_at
                     FROM entries WHERE store = ?1 AND key_hash = ?2",
                    params![store, key_hash],
                    decode_entry,
                );

                match result {
                    Ok(raw) => into_entry(raw).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Exact-key lookup across every live store, oldest store first.
    pub async fn match_any(&self, request: &RequestDescriptor) -> Result<Option<CachedEntry>, Error> {
        let key_hash = request.cache_key();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let result = conn.query_row(
                    "SELECT e.store, e.method, e.url, e.status, e.headers_json, e.body, e.cached_at
                     FROM entries e JOIN stores s ON s.name = e.store
                     WHERE e.key_hash = ?1
                     ORDER BY s.rowid
                     LIMIT 1",
                    params![key_hash],
                    decode_entry,
                );

                match result {
                    Ok(raw) => into_entry(raw).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    pub async fn delete_entry(&self, store: &str, request: &RequestDescriptor) -> Result<bool, Error> {
        let store = store.to_string();
        let key_hash = request.cache_key();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM entries WHERE store = ?1 AND key_hash = ?2", params![store, key_hash])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// `(method, url)` of every entry in `store`.
    pub async fn entry_keys(&self, store: &str) -> Result<Vec<(String, String)>, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE store = ?1 ORDER BY url")?;
                let keys = stmt
                    .query_map(params![store], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn get(url: &str) -> RequestDescriptor {
        RequestDescriptor::get(Url::parse(url).unwrap())
    }

    fn phrase_response() -> ResponseArtifact {
        ResponseArtifact::json(&serde_json::json!([{"id": 1, "english": "Hello"}]))
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("https://example.com/api/translations");

        db.put("api-v1", &req, &phrase_response()).await.unwrap();

        let entry = db.match_in("api-v1", &req).await.unwrap().unwrap();
        assert_eq!(entry.store, "api-v1");
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.url, "https://example.com/api/translations");
        assert_eq!(entry.response, phrase_response());
    }

    #[tokio::test]
    async fn test_put_opens_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("general-v1", &get("https://example.com/"), &ResponseArtifact::html("<p>hi</p>"))
            .await
            .unwrap();
        assert!(db.has_store("general-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("https://example.com/static/app.js");
        db.put("static-v1", &req, &ResponseArtifact::new(200, "v1")).await.unwrap();
        db.put("static-v1", &req, &ResponseArtifact::new(200, "v2")).await.unwrap();

        let entry = db.match_in("static-v1", &req).await.unwrap().unwrap();
        assert_eq!(entry.response.body, Bytes::from_static(b"v2"));
        assert_eq!(db.store_sizes().await.unwrap().get("static-v1"), Some(&1));
    }

    #[tokio::test]
    async fn test_match_is_store_scoped() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("https://example.com/api/translations");
        db.put("api-v1", &req, &phrase_response()).await.unwrap();

        assert!(db.match_in("static-v1", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_prefers_oldest_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("https://example.com/");
        db.open_store("static-v1").await.unwrap();
        db.open_store("general-v1").await.unwrap();
        db.put("general-v1", &req, &ResponseArtifact::new(200, "general")).await.unwrap();
        db.put("static-v1", &req, &ResponseArtifact::new(200, "static")).await.unwrap();

        let entry = db.match_any(&req).await.unwrap().unwrap();
        assert_eq!(entry.store, "static-v1");
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.match_any(&get("https://example.com/nothing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_store_drops_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("https://example.com/static/styles.css");
        db.put("static-v1", &req, &ResponseArtifact::new(200, "body{}")).await.unwrap();

        db.delete_store("static-v1").await.unwrap();
        assert!(db.match_any(&req).await.unwrap().is_none());

        db.open_store("static-v1").await.unwrap();
        assert!(db.match_in("static-v1", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_all_and_enumerate() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![
            (get("https://example.com/"), ResponseArtifact::html("<h1>home</h1>")),
            (get("https://example.com/static/app.js"), ResponseArtifact::new(200, "app()")),
        ];
        db.put_all("static-v1", &entries).await.unwrap();

        let keys = db.entry_keys("static-v1").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&("GET".to_string(), "https://example.com/".to_string())));
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("https://example.com/lessons");
        db.put("general-v1", &req, &ResponseArtifact::html("lessons")).await.unwrap();

        assert!(db.delete_entry("general-v1", &req).await.unwrap());
        assert!(!db.delete_entry("general-v1", &req).await.unwrap());
    }
}

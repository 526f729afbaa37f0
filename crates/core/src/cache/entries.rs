//! SQLite implementation of the cache store.
//!
//! Each cache generation is a row in `caches`; stored responses live in
//! `entries` and are removed with their cache through the foreign key
//! cascade. Handles bind to the cache row id, so a handle opened before a
//! delete cannot write into a later cache that reuses the name.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::{Cache, CacheStorage, check_storable};
use crate::{Error, InterceptedRequest, Response};

/// Handle to one named cache in a [`CacheDb`].
#[derive(Clone, Debug)]
pub struct SqliteCache {
    db: CacheDb,
    id: i64,
    name: String,
}

impl SqliteCache {
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn row_to_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, u16, String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_response((url, status, headers_json, body): (String, u16, String, Vec<u8>)) -> Result<Response, Error> {
    let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
        .map_err(|e| Error::CorruptEntry(format!("stored headers for {url}: {e}")))?;
    Ok(Response { url, status, headers, body: Bytes::from(body) })
}

#[async_trait]
impl Cache for SqliteCache {
    async fn put(&self, request: &InterceptedRequest, response: &Response) -> Result<(), Error> {
        check_storable(request, response)?;

        let key = request.cache_key();
        let key_hash = key.hash();
        let headers_json =
            serde_json::to_string(&response.headers).map_err(|e| Error::CacheWrite(format!("headers: {e}")))?;
        let body = response.body.to_vec();
        let status = response.status;
        let cache_id = self.id;
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (cache_id, key_hash, method, url, status, headers_json, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(cache_id, key_hash) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![cache_id, key_hash, key.method, key.url, status, headers_json, body, stored_at],
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(ref f, _)
                        if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Error::CacheWrite("cache was deleted".to_string())
                    }
                    other => Error::from(other),
                })?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn lookup(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error> {
        let key_hash = request.cache_key().hash();
        let cache_id = self.id;

        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(String, u16, String, Vec<u8>)>, Error> {
                let result = conn.query_row(
                    "SELECT url, status, headers_json, body FROM entries WHERE cache_id = ?1 AND key_hash = ?2",
                    params![cache_id, key_hash],
                    row_to_response,
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(into_response).transpose()
    }
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, Error> {
        let cache_name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let id = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![cache_name, created_at],
                )?;
                let id = conn.query_row("SELECT id FROM caches WHERE name = ?1", params![cache_name], |row| {
                    row.get(0)
                })?;
                Ok(id)
            })
            .await
            .map_err(Error::from)?;

        Ok(Arc::new(SqliteCache { db: self.clone(), id, name: name.to_string() }))
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn lookup(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error> {
        let key_hash = request.cache_key().hash();

        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, u16, String, Vec<u8>)>, Error> {
                let result = conn.query_row(
                    "SELECT e.url, e.status, e.headers_json, e.body
                     FROM entries e JOIN caches c ON c.id = e.cache_id
                     WHERE e.key_hash = ?1
                     ORDER BY c.id ASC LIMIT 1",
                    params![key_hash],
                    row_to_response,
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(into_response).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn request(url: &str) -> InterceptedRequest {
        InterceptedRequest::get(Url::parse(url).unwrap())
    }

    fn png(url: &str, body: &'static str) -> Response {
        Response::new(url, 200, body).with_header("content-type", "image/png")
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("henry-dashboard-v2.0.0").await.unwrap();
        db.open("henry-dashboard-v2.0.0").await.unwrap();
        assert_eq!(db.keys().await.unwrap(), vec!["henry-dashboard-v2.0.0"]);
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v1").await.unwrap();
        let req = request("https://example.com/assets/logo.png");
        let response = png(req.url().as_str(), "logo-bytes");

        cache.put(&req, &response).await.unwrap();

        let hit = cache.lookup(&req).await.unwrap().unwrap();
        assert_eq!(hit, response);
        assert_eq!(hit.content_type(), Some("image/png"));
        assert_eq!(db.lookup(&req).await.unwrap(), Some(response));
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v1").await.unwrap();
        let req = request("https://example.com/assets/logo.png");
        cache.put(&req, &png(req.url().as_str(), "first")).await.unwrap();
        cache.put(&req, &png(req.url().as_str(), "second")).await.unwrap();

        let hit = cache.lookup(&req).await.unwrap().unwrap();
        assert_eq!(hit.body, "second");
    }

    #[tokio::test]
    async fn test_lookup_prefers_oldest_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = request("https://example.com/assets/logo.png");
        let old = db.open("v1").await.unwrap();
        let new = db.open("v2").await.unwrap();
        new.put(&req, &png(req.url().as_str(), "new")).await.unwrap();
        old.put(&req, &png(req.url().as_str(), "old")).await.unwrap();

        let hit = db.lookup(&req).await.unwrap().unwrap();
        assert_eq!(hit.body, "old");
    }

    #[tokio::test]
    async fn test_delete_cascades_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v1").await.unwrap();
        let req = request("https://example.com/assets/logo.png");
        cache.put(&req, &png(req.url().as_str(), "logo")).await.unwrap();

        assert!(db.delete("v1").await.unwrap());
        assert!(!db.delete("v1").await.unwrap());
        assert!(db.keys().await.unwrap().is_empty());
        assert!(db.lookup(&req).await.unwrap().is_none());

        let count: i64 = db
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_corrupt_headers_are_a_store_fault() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v1").await.unwrap();
        let req = request("https://example.com/assets/logo.png");
        cache.put(&req, &png(req.url().as_str(), "logo")).await.unwrap();

        db.conn
            .call(|conn| conn.execute("UPDATE entries SET headers_json = 'not json'", []))
            .await
            .unwrap();

        let err = db.lookup(&req).await.unwrap_err();
        assert!(matches!(err, Error::CorruptEntry(_)));
        assert!(err.to_string().starts_with("CACHE_ERROR"));
        assert!(matches!(cache.lookup(&req).await, Err(Error::CorruptEntry(_))));
    }

    #[tokio::test]
    async fn test_put_after_delete_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let stale = db.open("v1").await.unwrap();
        db.delete("v1").await.unwrap();
        let fresh = db.open("v1").await.unwrap();

        let req = request("https://example.com/assets/logo.png");
        let err = stale.put(&req, &png(req.url().as_str(), "logo")).await;
        assert!(matches!(err, Err(Error::CacheWrite(_))));
        assert!(fresh.lookup(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v1").await.unwrap();
        let req = request("https://example.com/api/upload").with_method("POST");
        let err = cache.put(&req, &Response::new(req.url().as_str(), 200, "")).await;
        assert!(matches!(err, Err(Error::CacheWrite(_))));
    }
}

//! Cache store primitive the interceptor manages generations in.
//!
//! A store holds named caches (one per generation). Each cache maps a
//! request key (method + URL) to a response. Two backends are provided:
//!
//! - [`MemoryCacheStorage`]: in-process, for tests and embedding
//! - [`CacheDb`]: SQLite with async access via tokio-rusqlite
//!
//! Every operation is atomic on its own; callers never hold a lock across
//! two operations.

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;

use std::sync::Arc;

use async_trait::async_trait;

pub use crate::Error;
use crate::{InterceptedRequest, Response};

pub use connection::CacheDb;
pub use memory::MemoryCacheStorage;

/// Handle to one named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `response` under the request's key, replacing any previous entry.
    ///
    /// Fails with [`Error::CacheWrite`] for non-`GET` requests, partial
    /// (`206`) responses, or when the cache was deleted after it was opened.
    async fn put(&self, request: &InterceptedRequest, response: &Response) -> Result<(), Error>;

    /// Find the stored response for the request, if any.
    async fn lookup(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error>;
}

/// The set of named caches.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named cache, creating it if missing. Opening an existing name
    /// never creates a second cache.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, Error>;

    /// Names of all caches, in creation order.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Delete the named cache and its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Look the request up across every cache in creation order; first hit wins.
    async fn lookup(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error>;
}

/// Reject writes the cache primitive does not accept.
pub(crate) fn check_storable(request: &InterceptedRequest, response: &Response) -> Result<(), Error> {
    if request.method() != "GET" {
        return Err(Error::CacheWrite(format!("{} requests cannot be cached", request.method())));
    }
    if response.status == 206 {
        return Err(Error::CacheWrite("partial responses cannot be cached".to_string()));
    }
    Ok(())
}

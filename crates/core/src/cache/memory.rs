//! In-process cache store.
//!
//! Caches live in a creation-ordered list behind a tokio `RwLock`; entries
//! are keyed by [`RequestKey`]. A handle whose cache has been deleted stays
//! usable for lookups (it sees nothing) but rejects writes, matching the
//! SQLite backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cache, CacheStorage, check_storable};
use crate::{Error, InterceptedRequest, RequestKey, Response};

/// One named in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<RequestKey, Response>>,
    deleted: AtomicBool,
}

impl MemoryCache {
    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn put(&self, request: &InterceptedRequest, response: &Response) -> Result<(), Error> {
        check_storable(request, response)?;
        if self.deleted.load(Ordering::Acquire) {
            return Err(Error::CacheWrite("cache was deleted".to_string()));
        }
        self.entries
            .write()
            .await
            .insert(request.cache_key(), response.clone());
        Ok(())
    }

    async fn lookup(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error> {
        if self.deleted.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(self.entries.read().await.get(&request.cache_key()).cloned())
    }
}

/// In-memory [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<(String, Arc<MemoryCache>)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a named cache without creating it.
    pub async fn get(&self, name: &str) -> Option<Arc<MemoryCache>> {
        self.caches
            .read()
            .await
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, cache)| Arc::clone(cache))
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, Error> {
        let mut caches = self.caches.write().await;
        if let Some((_, cache)) = caches.iter().find(|(existing, _)| existing == name) {
            return Ok(Arc::clone(cache) as Arc<dyn Cache>);
        }

        let cache = Arc::new(MemoryCache::default());
        caches.push((name.to_string(), Arc::clone(&cache)));
        tracing::debug!(cache = name, "created cache");
        Ok(cache)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut caches = self.caches.write().await;
        match caches.iter().position(|(existing, _)| existing == name) {
            Some(index) => {
                let (_, cache) = caches.remove(index);
                cache.deleted.store(true, Ordering::Release);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lookup(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error> {
        let caches: Vec<Arc<MemoryCache>> = self
            .caches
            .read()
            .await
            .iter()
            .map(|(_, cache)| Arc::clone(cache))
            .collect();

        for cache in caches {
            if let Some(response) = cache.lookup(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

//! Request interceptor: install, activate and fetch handlers over a
//! versioned cache.
//!
//! ### Lifecycle
//! `Parsed → Installing → Installed → Activating → Activated`. Install asks
//! the host to skip waiting and pre-warms the current generation. Activate
//! deletes every other generation, claims open clients, then broadcasts
//! `CACHE_UPDATED`. Fetches are served from the first successful
//! activation on, including while a later activation is purging.
//!
//! ### Fetch policy
//! - Data (documents, `.json`, `.html`): network first, never stored; cache
//!   lookup only when the network rejects.
//! - Asset (everything else): network first, a clone of the response is
//!   stored in the current generation; cache lookup on rejection.
//!
//! Fallback lookups search every generation, not only the current one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::{
    CacheGeneration, CacheStorage, ClientMessage, ClientRegistry, Error, InterceptedRequest, Network, RequestClass,
    Response,
};

/// Where the interceptor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

/// How a cache write relates to the task that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// The caller waits for the write and sees its error.
    Awaited,
    /// The write runs on its own task; errors are logged and dropped.
    #[default]
    Detached,
}

/// Result of an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Always true: the new instance never waits for old clients to close.
    pub skip_waiting: bool,
    pub seeded: usize,
    pub seed_failures: usize,
}

/// Result of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub current: String,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    pub claimed: usize,
    pub notified: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
        }
    }
}

/// What happened to the cache copy of a served response.
#[derive(Debug)]
pub enum WriteStatus {
    NotStored,
    Stored,
    Failed(Error),
    /// Detached write still running. Its failure is logged either way.
    Pending(JoinHandle<Result<(), Error>>),
}

/// A resolved fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub class: RequestClass,
    pub source: ResponseSource,
    pub response: Response,
    pub write: WriteStatus,
}

impl FetchOutcome {
    /// Wait for a detached write to finish and record how it ended.
    pub async fn settle(&mut self) {
        if !matches!(self.write, WriteStatus::Pending(_)) {
            return;
        }
        if let WriteStatus::Pending(handle) = std::mem::replace(&mut self.write, WriteStatus::NotStored) {
            self.write = match handle.await {
                Ok(Ok(())) => WriteStatus::Stored,
                Ok(Err(e)) => WriteStatus::Failed(e),
                Err(e) => WriteStatus::Failed(Error::CacheWrite(e.to_string())),
            };
        }
    }
}

/// Host-facing lifecycle handlers. Each returns once the event's work is done.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn on_install(&self) -> Result<InstallOutcome, Error>;

    async fn on_activate(&self) -> Result<ActivateReport, Error>;

    /// Resolve an intercepted request. `Err(Error::CacheMiss)` means the
    /// network rejected and no generation holds the request.
    async fn on_fetch(&self, request: InterceptedRequest) -> Result<FetchOutcome, Error>;
}

/// Interceptor context: one current generation plus the host capabilities
/// it runs against.
pub struct Interceptor {
    generation: CacheGeneration,
    seeds: Vec<Url>,
    asset_writes: WriteMode,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<dyn ClientRegistry>,
    state: watch::Sender<LifecycleState>,
    /// Set by the first successful activation and never cleared.
    controlling: AtomicBool,
}

impl Interceptor {
    pub fn new(
        generation: CacheGeneration, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
        clients: Arc<dyn ClientRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Parsed);
        Self {
            generation,
            seeds: Vec::new(),
            asset_writes: WriteMode::Detached,
            storage,
            network,
            clients,
            state,
            controlling: AtomicBool::new(false),
        }
    }

    /// Resources to pre-warm at install. Empty means lazy caching only.
    pub fn with_seed_urls(mut self, seeds: Vec<Url>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Write mode for opportunistic asset caching (detached by default).
    pub fn with_asset_writes(mut self, mode: WriteMode) -> Self {
        self.asset_writes = mode;
        self
    }

    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Whether fetches are routed through the policy.
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::Acquire)
    }

    /// Move to `next` if the current state is in `allowed`; returns the state left.
    fn transition(&self, allowed: &[LifecycleState], next: LifecycleState) -> Result<LifecycleState, Error> {
        let mut from = self.state();
        let moved = self.state.send_if_modified(|state| {
            from = *state;
            if allowed.contains(state) {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(?from, to = ?next, "lifecycle transition");
            Ok(from)
        } else {
            Err(Error::InvalidState(format!("cannot move from {from:?} to {next:?}")))
        }
    }

    /// Store `response` under `request` in the current generation.
    async fn write(&self, request: InterceptedRequest, response: Response, mode: WriteMode) -> WriteStatus {
        let storage = Arc::clone(&self.storage);
        let name = self.generation.name().to_string();

        match mode {
            WriteMode::Awaited => match store(storage, name, request, response).await {
                Ok(()) => WriteStatus::Stored,
                Err(e) => WriteStatus::Failed(e),
            },
            WriteMode::Detached => WriteStatus::Pending(tokio::spawn(async move {
                let url = request.url().to_string();
                let result = store(storage, name, request, response).await;
                if let Err(e) = &result {
                    tracing::warn!(url = %url, error = %e, "detached cache write failed");
                }
                result
            })),
        }
    }

    async fn seed_one(&self, url: &Url) -> Result<(), Error> {
        let request = InterceptedRequest::get(url.clone());
        let response = self.network.fetch(&request).await?;
        if !response.is_success() {
            return Err(Error::CacheWrite(format!("seed {url} returned status {}", response.status)));
        }
        match self.write(request, response, WriteMode::Awaited).await {
            WriteStatus::Failed(e) => Err(e),
            _ => Ok(()),
        }
    }

    /// Pre-warm the current generation. Best effort: returns (seeded, failed).
    async fn seed(&self) -> (usize, usize) {
        if let Err(e) = self.storage.open(self.generation.name()).await {
            tracing::warn!(cache = self.generation.name(), error = %e, "could not open cache for seeding");
            return (0, self.seeds.len());
        }

        let results = join_all(self.seeds.iter().map(|url| self.seed_one(url))).await;

        let mut seeded = 0;
        for (url, result) in self.seeds.iter().zip(results) {
            match result {
                Ok(()) => seeded += 1,
                Err(e) => tracing::warn!(url = %url, error = %e, "seed entry not cached"),
            }
        }
        (seeded, self.seeds.len() - seeded)
    }

    async fn activate(&self) -> Result<ActivateReport, Error> {
        let current = self.generation.name().to_string();
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| !self.generation.is_current(name))
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => deleted.push(name),
                Err(e) => {
                    tracing::warn!(cache = %name, error = %e, "failed to delete stale cache");
                    failed.push(name);
                }
            }
        }

        if let Err(e) = self.storage.open(&current).await {
            tracing::warn!(cache = %current, error = %e, "could not open current cache");
        }

        let claimed = self.clients.claim().await?;

        // Purge is complete; clients may now react to the update.
        let message = ClientMessage::CacheUpdated;
        let mut notified = 0;
        for client in self.clients.match_all().await {
            match client.post_message(&message).await {
                Ok(()) => notified += 1,
                Err(e) => tracing::debug!(client = client.id(), error = %e, "client missed update notice"),
            }
        }

        Ok(ActivateReport { current, deleted, failed, claimed, notified })
    }

    async fn fallback(&self, request: &InterceptedRequest, class: RequestClass) -> Result<FetchOutcome, Error> {
        match self.storage.lookup(request).await {
            Ok(Some(response)) => {
                tracing::debug!(url = %request.url(), class = class.as_str(), "served from cache");
                Ok(FetchOutcome { class, source: ResponseSource::Cache, response, write: WriteStatus::NotStored })
            }
            Ok(None) => Err(Error::CacheMiss(request.url().to_string())),
            Err(e) => {
                tracing::warn!(url = %request.url(), error = %e, "cache lookup failed");
                Err(Error::CacheMiss(request.url().to_string()))
            }
        }
    }
}

async fn store(
    storage: Arc<dyn CacheStorage>, name: String, request: InterceptedRequest, response: Response,
) -> Result<(), Error> {
    let cache = storage.open(&name).await?;
    cache.put(&request, &response).await
}

#[async_trait]
impl LifecycleHandler for Interceptor {
    async fn on_install(&self) -> Result<InstallOutcome, Error> {
        self.transition(&[LifecycleState::Parsed, LifecycleState::Installed], LifecycleState::Installing)?;
        tracing::info!(cache = self.generation.name(), "installing, skip waiting");

        let (seeded, seed_failures) = self.seed().await;

        self.state.send_replace(LifecycleState::Installed);
        Ok(InstallOutcome { skip_waiting: true, seeded, seed_failures })
    }

    async fn on_activate(&self) -> Result<ActivateReport, Error> {
        let previous =
            self.transition(&[LifecycleState::Installed, LifecycleState::Activated], LifecycleState::Activating)?;

        match self.activate().await {
            Ok(report) => {
                self.controlling.store(true, Ordering::Release);
                self.state.send_replace(LifecycleState::Activated);
                tracing::info!(
                    cache = %report.current,
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    notified = report.notified,
                    "activated"
                );
                Ok(report)
            }
            Err(e) => {
                self.state.send_replace(previous);
                tracing::warn!(error = %e, restored = ?previous, "activation failed");
                Err(e)
            }
        }
    }

    async fn on_fetch(&self, request: InterceptedRequest) -> Result<FetchOutcome, Error> {
        if !self.is_controlling() {
            return Err(Error::InvalidState(format!("fetch received while {:?}", self.state())));
        }

        let class = request.classify();
        match self.network.fetch(&request).await {
            Ok(response) => {
                tracing::debug!(
                    url = %request.url(),
                    class = class.as_str(),
                    status = response.status,
                    "served from network"
                );
                let write = match class {
                    RequestClass::Data => WriteStatus::NotStored,
                    RequestClass::Asset => {
                        let url = request.url().to_string();
                        let status = self.write(request, response.clone(), self.asset_writes).await;
                        if let WriteStatus::Failed(e) = &status {
                            tracing::warn!(url = %url, error = %e, "asset not cached");
                        }
                        status
                    }
                };
                Ok(FetchOutcome { class, source: ResponseSource::Network, response, write })
            }
            Err(e) => {
                tracing::debug!(url = %request.url(), error = %e, "network failed, trying cache");
                self.fallback(&request, class).await
            }
        }
    }
}

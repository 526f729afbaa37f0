//! Client contexts controlled by the interceptor and the messages sent to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Error;

/// Message posted to client contexts.
///
/// Serializes as `{"type":"CACHE_UPDATED"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A new generation is active and older caches are gone.
    CacheUpdated,
}

/// A connected browsing context.
#[async_trait]
pub trait Client: Send + Sync {
    fn id(&self) -> &str;

    /// Deliver a message. No acknowledgment, no retry.
    async fn post_message(&self, message: &ClientMessage) -> Result<(), Error>;
}

/// Enumerates and claims client contexts.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Take control of every open client context. Returns how many are controlled.
    async fn claim(&self) -> Result<usize, Error>;

    /// Clients controlled at this moment.
    async fn match_all(&self) -> Vec<Arc<dyn Client>>;
}

/// A client backed by an unbounded channel.
#[derive(Debug)]
pub struct MemoryClient {
    id: String,
    controlled: AtomicBool,
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl MemoryClient {
    pub fn is_controlled(&self) -> bool {
        self.controlled.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Client for MemoryClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn post_message(&self, message: &ClientMessage) -> Result<(), Error> {
        self.tx
            .send(*message)
            .map_err(|_| Error::InvalidState(format!("client {} disconnected", self.id)))
    }
}

/// In-process [`ClientRegistry`]: each connected client is a channel receiver.
#[derive(Debug, Default)]
pub struct MemoryClients {
    clients: Mutex<Vec<Arc<MemoryClient>>>,
}

impl MemoryClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new, uncontrolled client context.
    pub fn connect(&self, id: &str) -> (Arc<MemoryClient>, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(MemoryClient { id: id.to_string(), controlled: AtomicBool::new(false), tx });
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&client));
        (client, rx)
    }

    fn snapshot(&self) -> Vec<Arc<MemoryClient>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ClientRegistry for MemoryClients {
    async fn claim(&self) -> Result<usize, Error> {
        let clients = self.snapshot();
        for client in &clients {
            client.controlled.store(true, Ordering::Release);
        }
        Ok(clients.len())
    }

    async fn match_all(&self) -> Vec<Arc<dyn Client>> {
        self.snapshot()
            .into_iter()
            .filter(|client| client.is_controlled())
            .map(|client| client as Arc<dyn Client>)
            .collect()
    }
}

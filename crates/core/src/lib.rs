//! Core types and shared functionality for swgate.
//!
//! This crate provides:
//! - The request interceptor and its install/activate/fetch lifecycle
//! - Cache store abstractions with in-memory and SQLite backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod generation;
pub mod interceptor;
pub mod network;
pub mod request;

pub use cache::{Cache, CacheDb, CacheStorage, MemoryCacheStorage};
pub use clients::{Client, ClientMessage, ClientRegistry, MemoryClients};
pub use config::AppConfig;
pub use error::Error;
pub use generation::{CACHE_PREFIX, CACHE_VERSION, CacheGeneration, SEED_URLS};
pub use interceptor::{
    ActivateReport, FetchOutcome, InstallOutcome, Interceptor, LifecycleHandler, LifecycleState, ResponseSource,
    WriteMode, WriteStatus,
};
pub use network::Network;
pub use request::{Destination, InterceptedRequest, RequestClass, RequestKey, Response};

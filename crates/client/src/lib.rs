//! Network client for swgate.
//!
//! This crate provides the reqwest-backed [`Network`](swgate_core::Network)
//! the interceptor fetches through, plus URL resolution shared by the host.

pub mod fetch;

pub use fetch::{HttpNetwork, NetworkConfig, UrlError, resolve};

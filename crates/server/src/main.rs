//! swgate host entry point.
//!
//! Runs the interceptor against a SQLite cache store and the HTTP network,
//! driven by newline-delimited JSON lifecycle events on stdin. Replies and
//! client messages go to stdout; logging goes to stderr.

use std::sync::Arc;

use anyhow::Result;
use swgate_client::{HttpNetwork, NetworkConfig, resolve};
use swgate_core::{AppConfig, CacheDb, Interceptor};
use tracing_subscriber::EnvFilter;
use url::Url;

mod clients;
mod error;
mod host;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let origin = Url::parse(&config.origin)?;
    let seeds = config
        .seed_urls
        .iter()
        .map(|seed| resolve(&origin, seed))
        .collect::<Result<Vec<_>, _>>()?;

    let storage = Arc::new(CacheDb::open(&config.db_path).await?);
    let network = Arc::new(HttpNetwork::new(NetworkConfig::from(&config))?);
    let (output, writer) = clients::stdout_writer();
    let clients = Arc::new(clients::StdioClients::new(output.clone()));

    let interceptor = Interceptor::new(config.generation(), storage, network, clients)
        .with_seed_urls(seeds)
        .with_asset_writes(config.asset_write_mode());

    tracing::info!(
        cache = interceptor.generation().name(),
        db_path = %config.db_path.display(),
        "Starting swgate host on stdio"
    );

    let host = host::Host::new(Arc::new(interceptor), origin, output);
    host.run(tokio::io::stdin()).await?;

    writer.await??;

    Ok(())
}

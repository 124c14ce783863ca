mod config;
mod error;
mod listing;
mod persistence;
mod service;
mod store;

use anyhow::Result;
use persistence::Persistence;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env()?;

    match config.database_url.as_deref() {
        Some(database_url) => {
            let persistence =
                persistence::PostgresPersistence::connect(database_url, config.database_pool_size)?;
            store::PostgresListingStore::init_schema(&mut persistence.get_connection()?)?;
            run(&config, persistence, store::PostgresListingStore::new_shared())
        }
        None => {
            warn!("{} not set, listings will not survive a restart", config::DATABASE_URL_VAR);
            run(
                &config,
                persistence::InMemoryPersistence::new(),
                store::InMemoryListingStore::new_shared(),
            )
        }
    }
}

fn run<P: Persistence>(
    config: &config::Config,
    persistence: P,
    listing_store: store::SharedListingStore<P>,
) -> Result<()> {
    let svc_ctr = service::ServiceControl::new();

    ctrlc::set_handler({
        let svc_ctr = svc_ctr.clone();
        move || {
            info!("Stopping all services...");
            svc_ctr.stop_all();
        }
    })?;

    let directory = Arc::new(service::Directory::new(
        persistence.clone(),
        listing_store.clone(),
    ));
    let ledger = Arc::new(service::BidLedger::new(persistence, listing_store));

    svc_ctr
        .spawn_loop(
            "http",
            service::HttpServer::new(config.bind_addr, directory, ledger)?,
        )?
        .join()
}

#[cfg(test)]
mod tests;

use std::sync::Arc;

use common::config::{IndexerConfig, LoadFromEnv};
use database::client::DbClient;
use evm::{
    db::DbStore,
    indexer::{EvmIndexer, IndexerSettings},
    provider::EvmProvider,
    registry::CommunityRegistry,
};
use eyre::Result;
use generic_indexer::{
    signal::failure_channel,
    supervisor::{ConnectionSupervisor, SupervisorConfig},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = IndexerConfig::from_env()?;

    let db_conn = database::connect::connect(&cfg.database.url).await?;
    info!("Connected to Indexer's DB");
    let store = Arc::new(DbStore::new(Arc::new(DbClient::new(db_conn)), cfg.chain.chain_id)?);

    let primary = Arc::new(EvmProvider::new(&cfg.chain.primary)?);
    let fallback = Arc::new(EvmProvider::new(&cfg.chain.fallback)?);

    let registry = CommunityRegistry::load(store.as_ref()).await?;

    let (signals, signal_rx) = failure_channel();
    let indexer = EvmIndexer::new(
        IndexerSettings::from_config(&cfg)?,
        primary,
        fallback,
        store.clone(),
        store,
        registry,
        signals,
    );
    let supervisor = ConnectionSupervisor::new(
        Arc::new(indexer),
        SupervisorConfig::from(&cfg.supervisor),
        signal_rx,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {:?}", e);
            // dropping the sender would stop the supervisor
            std::future::pending::<()>().await;
        }
        info!("Received ctrl-c, shutting down");
        let _ = shutdown_tx.send(true);
    });

    supervisor.run(shutdown_rx).await
}

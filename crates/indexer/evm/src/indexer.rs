use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use common::config::IndexerConfig;
use generic_indexer::{
    pipeline::IngestionPipeline,
    signal::{FailureChannel, ProviderErrorHeuristic, SignalSender},
    state::ProviderSlot,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, instrument, Instrument};

use crate::{
    addresses::ContractAddresses,
    decoder::EventDecoder,
    filter::LogFilter,
    live::LiveSubscription,
    processor::LogProcessor,
    progress::{BlockProgress, ReplayFloor},
    provider::ChainProvider,
    recovery::{RecoveryCoordinator, ReplayError, RetryPolicy},
    registry::CommunityRegistry,
    router::{EventRouter, RouterSettings},
    store::{CommunityStore, MetadataStore},
};

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub chain_id: u64,
    /// First block to replay when no progress has ever been recorded.
    pub start_block: u64,
    pub batch_size: u64,
    pub addresses: ContractAddresses,
    pub router: RouterSettings,
    pub heuristic: ProviderErrorHeuristic,
}

impl IndexerSettings {
    pub fn from_config(config: &IndexerConfig) -> eyre::Result<Self> {
        Ok(Self {
            chain_id: config.chain.chain_id,
            start_block: config.chain.start_block,
            batch_size: config.chain.block_sync_batch_size,
            addresses: ContractAddresses::try_from(&config.contracts)?,
            router: RouterSettings::try_from(&config.ingestion)?,
            heuristic: ProviderErrorHeuristic::new(&config.supervisor.provider_error_markers),
        })
    }
}

struct Running {
    slot: ProviderSlot,
    live: LiveSubscription,
    replay: JoinHandle<()>,
    replay_done: Arc<AtomicBool>,
}

/// The live subscription and recovery replay pair for one chain, armed against
/// whichever provider the supervisor selects.
pub struct EvmIndexer {
    settings: IndexerSettings,
    primary: Arc<dyn ChainProvider>,
    fallback: Arc<dyn ChainProvider>,
    store: Arc<dyn CommunityStore>,
    metadata: Arc<dyn MetadataStore>,
    registry: CommunityRegistry,
    signals: SignalSender,
    filter: LogFilter,
    progress: Arc<BlockProgress>,
    floor: Arc<ReplayFloor>,
    retry: RetryPolicy,
    running: Mutex<Option<Running>>,
}

impl EvmIndexer {
    pub fn new(
        settings: IndexerSettings,
        primary: Arc<dyn ChainProvider>,
        fallback: Arc<dyn ChainProvider>,
        store: Arc<dyn CommunityStore>,
        metadata: Arc<dyn MetadataStore>,
        registry: CommunityRegistry,
        signals: SignalSender,
    ) -> Self {
        Self {
            settings,
            primary,
            fallback,
            store,
            metadata,
            registry,
            signals,
            filter: LogFilter::community_ingestion(),
            progress: Arc::new(BlockProgress::default()),
            floor: Arc::new(ReplayFloor::default()),
            retry: RetryPolicy::default(),
            running: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn provider(&self, slot: ProviderSlot) -> Arc<dyn ChainProvider> {
        match slot {
            ProviderSlot::Primary => self.primary.clone(),
            ProviderSlot::Fallback => self.fallback.clone(),
        }
    }

    fn processor(&self, provider: Arc<dyn ChainProvider>) -> LogProcessor {
        let router = EventRouter::new(
            self.store.clone(),
            provider,
            self.registry.clone(),
            self.settings.addresses,
            self.settings.router,
            self.floor.clone(),
        );
        LogProcessor::new(
            EventDecoder::new(self.settings.addresses, self.registry.clone()),
            router,
            self.signals.clone(),
            self.settings.heuristic.clone(),
            self.floor.clone(),
        )
    }

    /// A recovery checkpoint must exist before the live feed is armed. Without one,
    /// resume from the last processed block, or from the configured start block on a
    /// fresh database.
    async fn ensure_checkpoint(&self) -> eyre::Result<u64> {
        let last_processed = self.metadata.last_processed_block().await?;
        if let Some(last) = last_processed {
            self.progress.advance(last);
        }

        let checkpoint = match self.metadata.recovery_checkpoint().await? {
            Some(checkpoint) => checkpoint,
            None => {
                let from = last_processed.unwrap_or(self.settings.start_block);
                self.metadata.set_recovery_checkpoint(from).await?;
                info!(from, "Recovery checkpoint set");
                from
            }
        };
        self.progress.advance(checkpoint);
        Ok(checkpoint)
    }

    fn spawn_replay(&self, coordinator: RecoveryCoordinator, from_block: u64) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let done = Arc::new(AtomicBool::new(false));
        let replay_done = done.clone();
        let signals = self.signals.clone();
        let heuristic = self.settings.heuristic.clone();

        let task = tokio::spawn(
            async move {
                match coordinator.replay(from_block).await {
                    Ok(_) => replay_done.store(true, Ordering::SeqCst),
                    Err(ReplayError::Provider(e)) => {
                        error!("Replay aborted, checkpoint kept: {}", e);
                        // replay has no retry path of its own beyond the fetch retries
                        let channel = e
                            .failure_channel(&heuristic)
                            .unwrap_or(FailureChannel::Connectivity);
                        signals.send(channel, e.to_string());
                    }
                    Err(ReplayError::Checkpoint(e)) => {
                        error!("Replay could not update sync markers: {:?}", e);
                        signals.registry_write(format!("recovery checkpoint: {e}"));
                    }
                }
            }
            .in_current_span(),
        );

        (task, done)
    }

    /// Tears down a running pair and writes the checkpoint a later recover resumes from.
    /// Pending legacy retries keep running.
    async fn halt(&self, running: Running) -> eyre::Result<()> {
        running.live.cancel().await;
        running.replay.abort();
        let _ = running.replay.await;

        let last = self.progress.get();
        let mut checkpoint = if running.replay_done.load(Ordering::SeqCst) {
            last
        } else {
            // never move past an unfinished replay
            match self.metadata.recovery_checkpoint().await? {
                Some(existing) => existing.min(last),
                None => last,
            }
        };
        if let Some(floor) = self.floor.lowest() {
            checkpoint = checkpoint.min(floor);
        }

        self.metadata.set_recovery_checkpoint(checkpoint).await?;
        self.floor.clear_failed(checkpoint);
        info!(slot = %running.slot, checkpoint, "Pipeline stopped");
        Ok(())
    }
}

#[async_trait]
impl IngestionPipeline for EvmIndexer {
    #[instrument(skip_all, fields(CHAIN = %self.settings.chain_id, %slot))]
    async fn recover(&self, slot: ProviderSlot) -> eyre::Result<()> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            self.halt(previous).await?;
        }

        let checkpoint = self.ensure_checkpoint().await?;
        let provider = self.provider(slot);
        let processor = self.processor(provider.clone());

        let live = LiveSubscription::arm(
            provider.clone(),
            &self.filter,
            processor.clone(),
            self.metadata.clone(),
            self.progress.clone(),
            self.signals.clone(),
        )
        .await?;

        let from_block = match self.metadata.recovery_checkpoint().await {
            Ok(stored) => stored.unwrap_or(checkpoint),
            Err(e) => {
                live.cancel().await;
                return Err(e);
            }
        };

        let coordinator = RecoveryCoordinator::new(
            provider,
            self.metadata.clone(),
            processor,
            self.progress.clone(),
            self.filter.clone(),
            self.settings.batch_size,
        )
        .with_retry_policy(self.retry);
        let (replay, replay_done) = self.spawn_replay(coordinator, from_block);

        *running = Some(Running {
            slot,
            live,
            replay,
            replay_done,
        });
        Ok(())
    }

    #[instrument(skip_all, fields(CHAIN = %self.settings.chain_id))]
    async fn stop(&self) -> eyre::Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Pipeline already stopped");
            return Ok(());
        };
        self.halt(running).await
    }

    async fn probe(&self, slot: ProviderSlot) -> eyre::Result<u64> {
        Ok(self.provider(slot).block_number().await?)
    }
}

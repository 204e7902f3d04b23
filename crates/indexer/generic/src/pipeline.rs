use async_trait::async_trait;

use crate::state::ProviderSlot;

/// The ingestion pair (live subscription + recovery replay) driven by the supervisor.
#[async_trait]
pub trait IngestionPipeline: Send + Sync + 'static {
    /// Arms the live feed against `slot`, then replays from the recovery checkpoint.
    async fn recover(&self, slot: ProviderSlot) -> eyre::Result<()>;

    /// Tears down every listener and persists the progress marker as the new checkpoint.
    async fn stop(&self) -> eyre::Result<()>;

    /// Liveness call against `slot`; returns the chain head.
    async fn probe(&self, slot: ProviderSlot) -> eyre::Result<u64>;
}

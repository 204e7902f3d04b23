use std::{sync::Arc, time::Duration};

use common::indexer::{with_retry_policy, MAX_RETRIES, RETRY_DELAY};
use tracing::{debug, info, instrument};

use crate::{
    error::ProviderError,
    filter::LogFilter,
    processor::{LogProcessor, ProcessOutcome},
    progress::BlockProgress,
    provider::ChainProvider,
    store::MetadataStore,
    types::ChainLog,
};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("fetching past logs failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("updating sync markers failed: {0:?}")]
    Checkpoint(eyre::Report),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub from_block: u64,
    pub head: u64,
    pub logs: usize,
    pub handled: usize,
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

/// Replays `[checkpoint, head]` through the shared processor, one log at a time.
#[derive(Clone)]
pub struct RecoveryCoordinator {
    provider: Arc<dyn ChainProvider>,
    metadata: Arc<dyn MetadataStore>,
    processor: LogProcessor,
    progress: Arc<BlockProgress>,
    filter: LogFilter,
    batch_size: u64,
    retry: RetryPolicy,
}

impl RecoveryCoordinator {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        metadata: Arc<dyn MetadataStore>,
        processor: LogProcessor,
        progress: Arc<BlockProgress>,
        filter: LogFilter,
        batch_size: u64,
    ) -> Self {
        Self {
            provider,
            metadata,
            processor,
            progress,
            filter,
            batch_size: batch_size.max(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Events are applied strictly in order: a later event may depend on registry
    /// state written by an earlier one. The checkpoint is cleared only after the
    /// whole range has been applied.
    #[instrument(skip_all, fields(from_block = from_block))]
    pub async fn replay(&self, from_block: u64) -> Result<ReplaySummary, ReplayError> {
        info!("recovering past events");

        let head = with_retry_policy(self.retry.attempts, self.retry.delay, || {
            self.provider.block_number()
        })
        .await?;

        let mut logs = self.fetch(from_block, head).await?;
        sort_for_replay(&mut logs);

        let total = logs.len();
        let (mut handled, mut deferred) = (0, 0);
        for log in logs {
            match self.processor.process(log).await {
                ProcessOutcome::Handled => handled += 1,
                ProcessOutcome::Deferred => deferred += 1,
                ProcessOutcome::Skipped => {}
            }
        }

        if self.progress.advance(head) {
            self.metadata
                .set_last_processed_block(head)
                .await
                .map_err(ReplayError::Checkpoint)?;
        }
        self.metadata
            .clear_recovery_checkpoint()
            .await
            .map_err(ReplayError::Checkpoint)?;

        info!(head, logs = total, handled, deferred, "past events recovered");
        Ok(ReplaySummary {
            from_block,
            head,
            logs: total,
            handled,
            deferred,
        })
    }

    async fn fetch(&self, from_block: u64, head: u64) -> Result<Vec<ChainLog>, ProviderError> {
        let mut logs = Vec::new();
        let mut start = from_block;

        while start <= head {
            let end = start.saturating_add(self.batch_size - 1).min(head);
            let batch = with_retry_policy(self.retry.attempts, self.retry.delay, || {
                self.provider.get_logs(&self.filter, start, end)
            })
            .await?;

            debug!(start, end, logs = batch.len(), "Fetched past logs");
            logs.extend(batch);
            start = end + 1;
        }

        Ok(logs)
    }
}

/// Ascending by block. The sort is stable, so provider order within a block is kept.
pub fn sort_for_replay(logs: &mut [ChainLog]) {
    logs.sort_by_key(|log| log.block_number);
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, Address, U256};

    use super::*;
    use crate::{contracts::CommunityV2, test_utils::*};

    const COMMUNITY: Address = address!("0x00000000000000000000000000000000000000c1");

    fn claim_at(block: u64) -> ChainLog {
        let event = CommunityV2::BeneficiaryClaim {
            beneficiary: addr(2),
            amount: U256::from(block),
        };
        log_for(COMMUNITY, block, &event)
    }

    async fn coordinator(provider: MockProvider, batch_size: u64) -> (Harness, RecoveryCoordinator) {
        let store = MemoryStore::with_communities([StoredCommunity::valid(1, COMMUNITY, true)]);
        let h = Harness::new(store, provider).await;
        let coordinator = RecoveryCoordinator::new(
            h.provider.clone(),
            h.store.clone(),
            h.processor.clone(),
            Arc::new(BlockProgress::default()),
            LogFilter::community_ingestion(),
            batch_size,
        )
        .with_retry_policy(RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        });
        (h, coordinator)
    }

    #[tokio::test]
    async fn replays_in_block_order() {
        let provider = MockProvider::new(10);
        for block in [5, 3, 4] {
            provider.push_log(claim_at(block));
        }
        let (h, coordinator) = coordinator(provider, 100).await;
        h.store.update(|s| s.recovery_checkpoint = Some(3));

        let summary = coordinator.replay(3).await.unwrap();

        assert_eq!(summary.logs, 3);
        assert_eq!(summary.handled, 3);
        let amounts: Vec<U256> = h.store.snapshot().claims.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![U256::from(3u64), U256::from(4u64), U256::from(5u64)]);
    }

    #[tokio::test]
    async fn fetches_in_windows_up_to_head() {
        let (h, coordinator) = coordinator(MockProvider::new(10), 3).await;

        coordinator.replay(2).await.unwrap();

        assert_eq!(
            *h.provider.log_requests.lock().unwrap(),
            vec![(2, 4), (5, 7), (8, 10)]
        );
    }

    #[tokio::test]
    async fn completion_clears_checkpoint_and_records_head() {
        let (h, coordinator) = coordinator(MockProvider::new(10), 100).await;
        h.store.update(|s| s.recovery_checkpoint = Some(3));

        coordinator.replay(3).await.unwrap();

        let state = h.store.snapshot();
        assert_eq!(state.recovery_checkpoint, None);
        assert_eq!(state.last_processed_block, Some(10));
    }

    #[tokio::test]
    async fn live_progress_past_head_is_not_rewound() {
        let (h, coordinator) = coordinator(MockProvider::new(10), 100).await;
        h.store.update(|s| s.last_processed_block = Some(12));
        coordinator.progress.advance(12);

        coordinator.replay(3).await.unwrap();

        assert_eq!(h.store.snapshot().last_processed_block, Some(12));
    }

    #[tokio::test]
    async fn provider_outage_keeps_checkpoint() {
        let provider = MockProvider::new(10);
        provider.set_down(true);
        let (h, coordinator) = coordinator(provider, 100).await;
        h.store.update(|s| s.recovery_checkpoint = Some(3));

        let err = coordinator.replay(3).await.unwrap_err();

        assert!(matches!(err, ReplayError::Provider(ProviderError::Transport { .. })));
        assert_eq!(h.store.snapshot().recovery_checkpoint, Some(3));
    }

    #[tokio::test]
    async fn failed_checkpoint_write_is_reported() {
        let (h, coordinator) = coordinator(MockProvider::new(10), 100).await;
        h.store.fail_metadata_writes(true);

        let err = coordinator.replay(3).await.unwrap_err();

        assert!(matches!(err, ReplayError::Checkpoint(_)));
    }
}

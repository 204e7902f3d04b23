use alloy::primitives::Address;
use tracing::{debug, error, info, warn};

use super::EventRouter;
use crate::{decoder::CommunityEvent, types::ChainLog};

impl EventRouter {
    /// Logs from contracts that are neither configured nor registered. Only the
    /// first-generation `ManagerAdded` matters here: it can arrive before the
    /// community's row is visible in the store.
    pub(super) async fn handle_legacy(
        &self,
        event: &CommunityEvent,
        log: &ChainLog,
    ) -> eyre::Result<bool> {
        let CommunityEvent::ManagerAdded { account, .. } = event else {
            debug!(address = %log.address, "Ignoring event from unknown contract");
            return Ok(false);
        };

        match self.resolve_community(log.address).await? {
            Some(community) => {
                self.store.add_manager(*account, community.internal_id).await?;
            }
            None => {
                debug!(
                    community = %log.address,
                    manager = %account,
                    "Community not stored yet, scheduling ManagerAdded retry"
                );
                self.schedule_manager_retry(log.address, *account, log)
                    .await;
            }
        }

        Ok(true)
    }

    /// Retries outlive the pipeline that scheduled them: they only need the store and
    /// the registry. Until one finishes, stop checkpoints stay at or below its block.
    async fn schedule_manager_retry(&self, community: Address, manager: Address, log: &ChainLog) {
        let router = self.clone();
        let interval = self.settings.legacy_retry_interval;
        let attempts = self.settings.legacy_retry_attempts;
        let tx = log.transaction_hash;
        let hold = self.floor.hold(log.block_number);

        let task = async move {
            let _hold = hold;
            for attempt in 1..=attempts {
                tokio::time::sleep(interval).await;

                match router.store.find_community_by_address(community).await {
                    Ok(Some(record)) => {
                        let id = record.internal_id;
                        router.registry.upsert(record);
                        match router.store.add_manager(manager, id).await {
                            Ok(()) => info!(%community, %manager, attempt, "Resolved delayed ManagerAdded"),
                            Err(e) => error!(%community, %manager, "Failed to add manager: {:?}", e),
                        }
                        return;
                    }
                    Ok(None) => debug!(%community, attempt, "Community still unknown"),
                    Err(e) => warn!(%community, attempt, "Community lookup failed: {:?}", e),
                }
            }

            warn!(
                %community,
                %manager,
                %tx,
                attempts,
                "Giving up on ManagerAdded for unresolved community"
            );
        };

        let mut retries = self.retries.lock().await;
        while retries.try_join_next().is_some() {}
        retries.spawn(task);
    }
}

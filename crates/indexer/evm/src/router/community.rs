use alloy::primitives::Address;
use tracing::error;

use super::EventRouter;
use crate::{
    decoder::CommunityEvent,
    registry::CommunityRecord,
    store::{BeneficiaryChange, Claim},
    types::ChainLog,
};

impl EventRouter {
    pub(super) async fn handle_community(
        &self,
        event: &CommunityEvent,
        log: &ChainLog,
    ) -> eyre::Result<bool> {
        let Some(community) = self.resolve_community(log.address).await? else {
            error!(
                address = %log.address,
                tx = %log.transaction_hash,
                "Community not found for community event"
            );
            return Ok(true);
        };

        self.apply_community_event(event, &community, log).await?;
        Ok(true)
    }

    async fn apply_community_event(
        &self,
        event: &CommunityEvent,
        community: &CommunityRecord,
        log: &ChainLog,
    ) -> eyre::Result<()> {
        let id = community.internal_id;

        match event {
            CommunityEvent::BeneficiaryAdded {
                manager,
                beneficiary,
            } => {
                let change = self.beneficiary_change(*manager, *beneficiary, id, log).await?;
                self.store.add_beneficiary(&change).await?;
                if community.is_public {
                    self.registry.add_public_beneficiary(*beneficiary);
                }
            }
            CommunityEvent::BeneficiaryRemoved {
                manager,
                beneficiary,
            } => {
                let change = self.beneficiary_change(*manager, *beneficiary, id, log).await?;
                self.store.remove_beneficiary(&change).await?;
            }
            CommunityEvent::BeneficiaryClaim {
                beneficiary,
                amount,
            } => {
                let claim = Claim {
                    beneficiary: *beneficiary,
                    community_id: id,
                    amount: *amount,
                    tx_hash: log.transaction_hash,
                    log_index: log.log_index,
                    at: self.block_time(log).await?,
                };
                self.store.add_claim(&claim).await?;
            }
            CommunityEvent::ManagerAdded { account, .. } => {
                self.store.add_manager(*account, id).await?;
            }
            CommunityEvent::ManagerRemoved { account, .. } => {
                self.store.remove_manager(*account, id).await?;
            }
            CommunityEvent::ManagerBlocked { manager } => {
                self.store.set_manager_blocked(*manager, id, true).await?;
            }
            CommunityEvent::ManagerUnblocked { manager } => {
                self.store.set_manager_blocked(*manager, id, false).await?;
            }
            CommunityEvent::ParamsUpdated(params) => {
                self.store.update_community_params(id, params).await?;
            }
            CommunityEvent::Locked => self.store.set_community_blocked(id, true).await?,
            CommunityEvent::Unlocked => self.store.set_community_blocked(id, false).await?,
        }

        Ok(())
    }

    /// Older contracts do not name the manager; the transaction sender is the manager.
    async fn beneficiary_change(
        &self,
        manager: Option<Address>,
        beneficiary: Address,
        community_id: i32,
        log: &ChainLog,
    ) -> eyre::Result<BeneficiaryChange> {
        let manager = match manager {
            Some(manager) => manager,
            None => self.provider.transaction_sender(log.transaction_hash).await?,
        };

        Ok(BeneficiaryChange {
            beneficiary,
            community_id,
            manager,
            tx_hash: log.transaction_hash,
            at: self.block_time(log).await?,
        })
    }
}

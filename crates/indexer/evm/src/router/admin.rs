use alloy::primitives::Address;
use tracing::{debug, error, info, warn};

use super::EventRouter;
use crate::{
    decoder::AdminEvent,
    registry::CommunityRecord,
    store::CommunityParams,
    types::ChainLog,
};

impl EventRouter {
    pub(super) async fn handle_admin(&self, event: &AdminEvent, log: &ChainLog) -> eyre::Result<bool> {
        match event {
            AdminEvent::CommunityAdded {
                community,
                managers,
                params,
            } => self.community_added(*community, managers, params).await?,
            AdminEvent::CommunityRemoved { community } => {
                self.community_removed(*community, log).await?
            }
            AdminEvent::CommunityMigrated {
                managers,
                community,
                previous,
            } => self.community_migrated(*community, *previous, managers).await?,
        }
        Ok(true)
    }

    async fn community_added(
        &self,
        community: Address,
        managers: &[Address],
        params: &CommunityParams,
    ) -> eyre::Result<()> {
        if let Some(existing) = self.store.find_community_by_address(community).await? {
            debug!(%community, id = existing.internal_id, "Community already registered");
            self.registry.upsert(existing);
            return Ok(());
        }

        let Some(requester) = managers.first() else {
            error!(%community, "CommunityAdded without managers");
            return Ok(());
        };

        let Some(pending) = self.store.find_pending_community(*requester).await? else {
            error!(%community, %requester, "No pending community request for requester");
            return Ok(());
        };

        for manager in managers {
            self.store.add_manager(*manager, pending.id).await?;
        }

        let promoted = self.store.mark_community_valid(pending.id, community).await?;
        if promoted == 0 {
            error!(%community, id = pending.id, "Pending community could not be marked valid");
            return Ok(());
        }
        self.store.update_community_params(pending.id, params).await?;

        self.registry.upsert(CommunityRecord {
            contract_address: community,
            internal_id: pending.id,
            public_id: pending.public_id,
            is_public: pending.is_public,
        });
        info!(%community, id = pending.id, "Community added");
        Ok(())
    }

    async fn community_removed(&self, community: Address, log: &ChainLog) -> eyre::Result<()> {
        let Some(record) = self.resolve_community(community).await? else {
            error!(%community, "Removed community not found");
            return Ok(());
        };

        let at = self.block_time(log).await?;
        self.store.remove_community(record.internal_id, at).await?;
        info!(%community, id = record.internal_id, "Community removed");
        Ok(())
    }

    async fn community_migrated(
        &self,
        community: Address,
        previous: Address,
        managers: &[Address],
    ) -> eyre::Result<()> {
        let record = match self.resolve_community(previous).await? {
            Some(record) => record,
            None => {
                // replayed after the migration was already applied
                if let Some(migrated) = self.resolve_community(community).await? {
                    debug!(%community, id = migrated.internal_id, "Migration already applied");
                } else {
                    error!(%community, %previous, "Migrated community not found");
                }
                return Ok(());
            }
        };

        let updated = self
            .store
            .migrate_community(record.internal_id, previous, community)
            .await?;
        if updated == 0 {
            error!(%community, id = record.internal_id, "Migration updated no community row");
            return Ok(());
        }

        for manager in managers {
            self.store.add_manager(*manager, record.internal_id).await?;
        }

        self.registry.upsert(CommunityRecord {
            contract_address: community,
            ..record.clone()
        });
        info!(%community, %previous, id = record.internal_id, "Community migrated");

        match self.provider.community_params(community).await {
            Ok(params) => {
                self.store
                    .update_community_params(record.internal_id, &params)
                    .await?
            }
            Err(e) => warn!(%community, "Could not refresh migrated community params: {}", e),
        }
        Ok(())
    }
}

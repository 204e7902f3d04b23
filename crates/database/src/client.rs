use crate::entities::sync_state;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    DatabaseConnection, EntityTrait,
    sea_query::OnConflict,
};

use tracing::error;

#[derive(Clone, Debug)]
pub struct DbClient {
    pub primary: DatabaseConnection,
}

impl DbClient {
    pub fn new(primary: DatabaseConnection) -> Self {
        Self { primary }
    }

    pub async fn get_sync_state(&self, chain_id: i64) -> eyre::Result<Option<sync_state::Model>> {
        let res = sync_state::Entity::find_by_id(chain_id)
            .one(&self.primary)
            .await?;
        Ok(res)
    }

    pub async fn upsert_last_processed_block(
        &self,
        chain_id: i64,
        block_number: i64,
    ) -> eyre::Result<()> {
        let model = sync_state::ActiveModel {
            chain_id: Set(chain_id),
            last_processed_block: Set(Some(block_number)),
            recovery_start_block: NotSet,
        };
        self.upsert_sync_state(model, sync_state::Column::LastProcessedBlock)
            .await
    }

    /// `None` clears the checkpoint.
    pub async fn upsert_recovery_start_block(
        &self,
        chain_id: i64,
        block_number: Option<i64>,
    ) -> eyre::Result<()> {
        let model = sync_state::ActiveModel {
            chain_id: Set(chain_id),
            last_processed_block: NotSet,
            recovery_start_block: Set(block_number),
        };
        self.upsert_sync_state(model, sync_state::Column::RecoveryStartBlock)
            .await
    }

    async fn upsert_sync_state(
        &self,
        model: sync_state::ActiveModel,
        column: sync_state::Column,
    ) -> eyre::Result<()> {
        sync_state::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sync_state::Column::ChainId)
                    .update_column(column)
                    .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await
            .map_err(|e| {
                error!("Failed to upsert sync state: {:?}", e);
                eyre::eyre!("Failed to upsert sync state: {:?}", e)
            })?;

        Ok(())
    }
}

use sea_orm::{DbErr, EntityTrait, sea_query::OnConflict};
use tracing::error;

use crate::{
    client::DbClient,
    entities::{beneficiary_transaction, claim, inflow},
};

impl DbClient {
    pub async fn insert_claim(&self, model: claim::ActiveModel) -> eyre::Result<u64> {
        let inserted = claim::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([claim::Column::TxHash, claim::Column::LogIndex])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to insert claim: {:?}", e);
                eyre::eyre!("Failed to insert claim: {:?}", e)
            })?;

        Ok(inserted)
    }

    pub async fn insert_inflow(&self, model: inflow::ActiveModel) -> eyre::Result<u64> {
        let inserted = inflow::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([inflow::Column::TxHash, inflow::Column::LogIndex])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to insert inflow: {:?}", e);
                eyre::eyre!("Failed to insert inflow: {:?}", e)
            })?;

        Ok(inserted)
    }

    pub async fn bulk_insert_beneficiary_transactions(
        &self,
        models: Vec<beneficiary_transaction::ActiveModel>,
    ) -> eyre::Result<()> {
        if models.is_empty() {
            return Ok(());
        }

        beneficiary_transaction::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    beneficiary_transaction::Column::TxHash,
                    beneficiary_transaction::Column::LogIndex,
                    beneficiary_transaction::Column::Beneficiary,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to bulk insert beneficiary transactions: {:?}", e);
                eyre::eyre!("Failed to bulk insert beneficiary transactions: {:?}", e)
            })?;

        Ok(())
    }
}

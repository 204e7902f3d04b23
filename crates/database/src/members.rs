use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    sea_query::{Expr, OnConflict},
};
use tracing::error;

use crate::{
    client::DbClient,
    entities::{beneficiary, manager},
};

impl DbClient {
    /// Inserts or reactivates a beneficiary; replaying the same addition leaves the row unchanged.
    pub async fn upsert_beneficiary(
        &self,
        address: &str,
        community_id: i32,
        added_by: &str,
        tx_hash: &str,
        at: DateTime<Utc>,
    ) -> eyre::Result<()> {
        let model = beneficiary::ActiveModel {
            address: Set(address.to_owned()),
            community_id: Set(community_id),
            added_by: Set(added_by.to_owned()),
            active: Set(true),
            tx_hash: Set(tx_hash.to_owned()),
            updated_at: Set(at.into()),
        };

        beneficiary::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    beneficiary::Column::Address,
                    beneficiary::Column::CommunityId,
                ])
                .update_columns([
                    beneficiary::Column::AddedBy,
                    beneficiary::Column::Active,
                    beneficiary::Column::TxHash,
                    beneficiary::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to upsert beneficiary {}: {:?}", address, e);
                eyre::eyre!("Failed to upsert beneficiary {}: {:?}", address, e)
            })?;

        Ok(())
    }

    pub async fn deactivate_beneficiary(
        &self,
        address: &str,
        community_id: i32,
        tx_hash: &str,
        at: DateTime<Utc>,
    ) -> eyre::Result<u64> {
        let res = beneficiary::Entity::update_many()
            .col_expr(beneficiary::Column::Active, Expr::value(false))
            .col_expr(beneficiary::Column::TxHash, Expr::value(tx_hash))
            .col_expr(beneficiary::Column::UpdatedAt, Expr::value(at))
            .filter(beneficiary::Column::Address.eq(address))
            .filter(beneficiary::Column::CommunityId.eq(community_id))
            .exec(&self.primary)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn active_beneficiaries_in(&self, community_ids: Vec<i32>) -> eyre::Result<Vec<String>> {
        if community_ids.is_empty() {
            return Ok(Vec::new());
        }

        let addresses = beneficiary::Entity::find()
            .select_only()
            .column(beneficiary::Column::Address)
            .filter(beneficiary::Column::Active.eq(true))
            .filter(beneficiary::Column::CommunityId.is_in(community_ids))
            .distinct()
            .into_tuple::<String>()
            .all(&self.primary)
            .await?;
        Ok(addresses)
    }

    pub async fn upsert_manager(
        &self,
        address: &str,
        community_id: i32,
        active: bool,
    ) -> eyre::Result<()> {
        let model = manager::ActiveModel {
            address: Set(address.to_owned()),
            community_id: Set(community_id),
            active: Set(active),
            blocked: Set(false),
            updated_at: Set(Utc::now().into()),
        };

        manager::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([manager::Column::Address, manager::Column::CommunityId])
                    .update_columns([manager::Column::Active, manager::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to upsert manager {}: {:?}", address, e);
                eyre::eyre!("Failed to upsert manager {}: {:?}", address, e)
            })?;

        Ok(())
    }

    pub async fn set_manager_blocked(
        &self,
        address: &str,
        community_id: i32,
        blocked: bool,
    ) -> eyre::Result<()> {
        let model = manager::ActiveModel {
            address: Set(address.to_owned()),
            community_id: Set(community_id),
            active: Set(true),
            blocked: Set(blocked),
            updated_at: Set(Utc::now().into()),
        };

        manager::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([manager::Column::Address, manager::Column::CommunityId])
                    .update_columns([manager::Column::Blocked, manager::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.primary)
            .await?;

        Ok(())
    }
}

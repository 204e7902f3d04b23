use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
    sea_query::Expr,
};
use tracing::error;

use crate::{
    client::DbClient,
    entities::{
        beneficiary, community, inflow,
        sea_orm_active_enums::{CommunityStatus, CommunityVisibility},
    },
};

/// Claim economics as stored on a community row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommunityEconomics {
    pub claim_amount: String,
    pub max_claim: String,
    pub decrease_step: Option<String>,
    pub base_interval: String,
    pub increment_interval: String,
}

impl DbClient {
    pub async fn valid_communities(&self) -> eyre::Result<Vec<community::Model>> {
        let communities = community::Entity::find()
            .filter(community::Column::Status.eq(CommunityStatus::Valid))
            .filter(community::Column::ContractAddress.is_not_null())
            .all(&self.primary)
            .await?;
        Ok(communities)
    }

    pub async fn public_community_ids(&self) -> eyre::Result<Vec<i32>> {
        let ids = community::Entity::find()
            .filter(community::Column::Status.eq(CommunityStatus::Valid))
            .filter(community::Column::Visibility.eq(CommunityVisibility::Public))
            .all(&self.primary)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        Ok(ids)
    }

    pub async fn find_community_by_contract(
        &self,
        contract_address: &str,
    ) -> eyre::Result<Option<community::Model>> {
        let res = community::Entity::find()
            .filter(community::Column::ContractAddress.eq(contract_address))
            .one(&self.primary)
            .await?;
        Ok(res)
    }

    /// Oldest pending request submitted by `requested_by`.
    pub async fn find_pending_community_by_requester(
        &self,
        requested_by: &str,
    ) -> eyre::Result<Option<community::Model>> {
        let res = community::Entity::find()
            .filter(community::Column::RequestedBy.eq(requested_by))
            .filter(community::Column::Status.eq(CommunityStatus::Pending))
            .order_by_asc(community::Column::Id)
            .one(&self.primary)
            .await?;
        Ok(res)
    }

    pub async fn update_community_economics(
        &self,
        community_id: i32,
        economics: CommunityEconomics,
    ) -> eyre::Result<u64> {
        let mut update = community::Entity::update_many()
            .col_expr(
                community::Column::ClaimAmount,
                Expr::value(economics.claim_amount),
            )
            .col_expr(community::Column::MaxClaim, Expr::value(economics.max_claim))
            .col_expr(
                community::Column::BaseInterval,
                Expr::value(economics.base_interval),
            )
            .col_expr(
                community::Column::IncrementInterval,
                Expr::value(economics.increment_interval),
            )
            .col_expr(community::Column::UpdatedAt, Expr::value(Utc::now()));

        if let Some(decrease_step) = economics.decrease_step {
            update = update.col_expr(community::Column::DecreaseStep, Expr::value(decrease_step));
        }

        let res = update
            .filter(community::Column::Id.eq(community_id))
            .exec(&self.primary)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn set_community_blocked(&self, community_id: i32, blocked: bool) -> eyre::Result<u64> {
        let res = community::Entity::update_many()
            .col_expr(community::Column::Blocked, Expr::value(blocked))
            .col_expr(community::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(community::Column::Id.eq(community_id))
            .exec(&self.primary)
            .await?;
        Ok(res.rows_affected)
    }

    /// Promotes a pending request to a live community at `contract_address`.
    /// Returns the number of rows updated; zero means the request was not pending.
    pub async fn mark_community_valid(
        &self,
        community_id: i32,
        contract_address: &str,
    ) -> eyre::Result<u64> {
        let res = community::Entity::update_many()
            .col_expr(community::Column::Status, Expr::value(CommunityStatus::Valid))
            .col_expr(
                community::Column::ContractAddress,
                Expr::value(contract_address),
            )
            .col_expr(community::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(community::Column::Id.eq(community_id))
            .filter(community::Column::Status.eq(CommunityStatus::Pending))
            .exec(&self.primary)
            .await?;
        Ok(res.rows_affected)
    }

    /// Marks the community removed and deactivates all of its beneficiaries.
    pub async fn remove_community(
        &self,
        community_id: i32,
        removed_at: DateTime<Utc>,
    ) -> eyre::Result<()> {
        let txn = self.primary.begin().await?;

        community::Entity::update_many()
            .col_expr(community::Column::Status, Expr::value(CommunityStatus::Removed))
            .col_expr(community::Column::DeletedAt, Expr::value(removed_at))
            .col_expr(community::Column::UpdatedAt, Expr::value(removed_at))
            .filter(community::Column::Id.eq(community_id))
            .exec(&txn)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to remove community {}: {:?}", community_id, e);
                eyre::eyre!("Failed to remove community {}: {:?}", community_id, e)
            })?;

        beneficiary::Entity::update_many()
            .col_expr(beneficiary::Column::Active, Expr::value(false))
            .col_expr(beneficiary::Column::UpdatedAt, Expr::value(removed_at))
            .filter(beneficiary::Column::CommunityId.eq(community_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Moves the community and every inflow recorded against `previous` to `new`.
    pub async fn migrate_community(
        &self,
        community_id: i32,
        previous: &str,
        new: &str,
    ) -> eyre::Result<u64> {
        let txn = self.primary.begin().await?;

        let res = community::Entity::update_many()
            .col_expr(community::Column::ContractAddress, Expr::value(new))
            .col_expr(community::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(community::Column::Id.eq(community_id))
            .exec(&txn)
            .await?;

        inflow::Entity::update_many()
            .col_expr(inflow::Column::ContractAddress, Expr::value(new))
            .filter(inflow::Column::ContractAddress.eq(previous))
            .exec(&txn)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to migrate inflows from {}: {:?}", previous, e);
                eyre::eyre!("Failed to migrate inflows from {}: {:?}", previous, e)
            })?;

        txn.commit().await?;
        Ok(res.rows_affected)
    }
}

use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use tracing::error;

use crate::{
    client::DbClient,
    entities::{community, proposal, sea_orm_active_enums::ProposalStatus},
};

impl DbClient {
    /// Links `proposal_id` to the community and starts tracking the proposal as pending.
    /// Both writes commit together. Returns false when the proposal was already tracked.
    pub async fn attach_proposal(
        &self,
        community_id: i32,
        proposal_id: i64,
        end_block: i64,
    ) -> eyre::Result<bool> {
        let txn = self.primary.begin().await?;

        community::Entity::update_many()
            .col_expr(community::Column::ProposalId, Expr::value(proposal_id))
            .col_expr(community::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(community::Column::Id.eq(community_id))
            .exec(&txn)
            .await?;

        let model = proposal::ActiveModel {
            id: Set(proposal_id),
            community_id: Set(community_id),
            status: Set(ProposalStatus::Pending),
            end_block: Set(end_block),
            updated_at: Set(Utc::now().into()),
        };

        let inserted = proposal::Entity::insert(model)
            .on_conflict(
                OnConflict::column(proposal::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(|e: DbErr| {
                error!("Failed to insert proposal {}: {:?}", proposal_id, e);
                eyre::eyre!("Failed to insert proposal {}: {:?}", proposal_id, e)
            })?;

        txn.commit().await?;
        Ok(inserted > 0)
    }

    /// Returns false when no tracked proposal has this id.
    pub async fn update_proposal_status(
        &self,
        proposal_id: i64,
        status: ProposalStatus,
        end_block: Option<i64>,
    ) -> eyre::Result<bool> {
        let mut update = proposal::Entity::update_many()
            .col_expr(proposal::Column::Status, Expr::value(status))
            .col_expr(proposal::Column::UpdatedAt, Expr::value(Utc::now()));

        if let Some(end_block) = end_block {
            update = update.col_expr(proposal::Column::EndBlock, Expr::value(end_block));
        }

        let res = update
            .filter(proposal::Column::Id.eq(proposal_id))
            .exec(&self.primary)
            .await?;
        Ok(res.rows_affected > 0)
    }
}

use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{CommunityStatus, CommunityVisibility};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "community")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub public_id: String,
    pub requested_by: String,
    pub contract_address: Option<String>,
    pub status: CommunityStatus,
    pub visibility: CommunityVisibility,
    pub proposal_id: Option<i64>,
    pub claim_amount: String,
    pub max_claim: String,
    pub decrease_step: String,
    pub base_interval: String,
    pub increment_interval: String,
    pub blocked: bool,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

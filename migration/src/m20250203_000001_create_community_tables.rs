use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Community::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Community::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Community::PublicId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Community::RequestedBy).string_len(42).not_null())
                    .col(ColumnDef::new(Community::ContractAddress).string_len(42).null())
                    .col(ColumnDef::new(Community::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Community::Visibility).string_len(16).not_null())
                    .col(ColumnDef::new(Community::ProposalId).big_integer().null())
                    // uint256 values as decimal strings
                    .col(ColumnDef::new(Community::ClaimAmount).string_len(78).not_null())
                    .col(ColumnDef::new(Community::MaxClaim).string_len(78).not_null())
                    .col(
                        ColumnDef::new(Community::DecreaseStep)
                            .string_len(78)
                            .not_null()
                            .default("0"),
                    )
                    .col(ColumnDef::new(Community::BaseInterval).string_len(78).not_null())
                    .col(
                        ColumnDef::new(Community::IncrementInterval)
                            .string_len(78)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Community::Blocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Community::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Community::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_community_contract_address")
                    .table(Community::Table)
                    .col(Community::ContractAddress)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_community_requested_by")
                    .table(Community::Table)
                    .col(Community::RequestedBy)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Beneficiary::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Beneficiary::Address).string_len(42).not_null())
                    .col(ColumnDef::new(Beneficiary::CommunityId).integer().not_null())
                    .col(ColumnDef::new(Beneficiary::AddedBy).string_len(42).not_null())
                    .col(ColumnDef::new(Beneficiary::Active).boolean().not_null())
                    .col(ColumnDef::new(Beneficiary::TxHash).string_len(66).not_null())
                    .col(
                        ColumnDef::new(Beneficiary::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(Beneficiary::Address)
                            .col(Beneficiary::CommunityId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_beneficiary_community")
                            .from(Beneficiary::Table, Beneficiary::CommunityId)
                            .to(Community::Table, Community::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Manager::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Manager::Address).string_len(42).not_null())
                    .col(ColumnDef::new(Manager::CommunityId).integer().not_null())
                    .col(ColumnDef::new(Manager::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(Manager::Blocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Manager::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(Manager::Address)
                            .col(Manager::CommunityId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_manager_community")
                            .from(Manager::Table, Manager::CommunityId)
                            .to(Community::Table, Community::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Proposal::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Proposal::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Proposal::CommunityId).integer().not_null())
                    .col(ColumnDef::new(Proposal::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Proposal::EndBlock).big_integer().not_null())
                    .col(
                        ColumnDef::new(Proposal::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_proposal_community")
                            .from(Proposal::Table, Proposal::CommunityId)
                            .to(Community::Table, Community::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Proposal::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Manager::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Beneficiary::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Community::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Community {
    Table,
    Id,
    PublicId,
    RequestedBy,
    ContractAddress,
    Status,     // pending | valid | removed
    Visibility, // public | private
    ProposalId,
    ClaimAmount,
    MaxClaim,
    DecreaseStep,
    BaseInterval,
    IncrementInterval,
    Blocked,
    DeletedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Beneficiary {
    Table,
    Address,
    CommunityId,
    AddedBy,
    Active,
    TxHash,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Manager {
    Table,
    Address,
    CommunityId,
    Active,
    Blocked,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Proposal {
    Table,
    Id,
    CommunityId,
    Status, // pending | queued | executed | canceled
    EndBlock,
    UpdatedAt,
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Claim, inflow and transfer rows are keyed by the log that produced them
        manager
            .create_table(
                Table::create()
                    .table(Claim::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Claim::TxHash).string_len(66).not_null())
                    .col(ColumnDef::new(Claim::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(Claim::Beneficiary).string_len(42).not_null())
                    .col(ColumnDef::new(Claim::CommunityId).integer().not_null())
                    .col(ColumnDef::new(Claim::Amount).string_len(78).not_null())
                    .col(
                        ColumnDef::new(Claim::ClaimedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(Index::create().col(Claim::TxHash).col(Claim::LogIndex))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_claim_community_id")
                    .table(Claim::Table)
                    .col(Claim::CommunityId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Inflow::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Inflow::TxHash).string_len(66).not_null())
                    .col(ColumnDef::new(Inflow::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(Inflow::From).string_len(42).not_null())
                    .col(ColumnDef::new(Inflow::ContractAddress).string_len(42).not_null())
                    .col(ColumnDef::new(Inflow::Amount).string_len(78).not_null())
                    .col(ColumnDef::new(Inflow::BlockNumber).big_integer().not_null())
                    .col(
                        ColumnDef::new(Inflow::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(Index::create().col(Inflow::TxHash).col(Inflow::LogIndex))
                    .to_owned(),
            )
            .await?;

        // migrations rewrite inflows by contract address
        manager
            .create_index(
                Index::create()
                    .name("idx_inflow_contract_address")
                    .table(Inflow::Table)
                    .col(Inflow::ContractAddress)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BeneficiaryTransaction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::TxHash)
                            .string_len(66)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::LogIndex)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::Beneficiary)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::WithAddress)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::Amount)
                            .string_len(78)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::IsIncoming)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BeneficiaryTransaction::TxAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(BeneficiaryTransaction::TxHash)
                            .col(BeneficiaryTransaction::LogIndex)
                            .col(BeneficiaryTransaction::Beneficiary),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BeneficiaryTransaction::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Inflow::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Claim::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Claim {
    Table,
    TxHash,
    LogIndex,
    Beneficiary,
    CommunityId,
    Amount,
    ClaimedAt,
}

#[derive(DeriveIden)]
enum Inflow {
    Table,
    TxHash,
    LogIndex,
    From,
    ContractAddress,
    Amount,
    BlockNumber,
    ReceivedAt,
}

#[derive(DeriveIden)]
enum BeneficiaryTransaction {
    Table,
    TxHash,
    LogIndex,
    Beneficiary,
    WithAddress,
    Amount,
    IsIncoming,
    TxAt,
}

use std::{str::FromStr, sync::Arc};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database::{
    client::DbClient,
    communities::CommunityEconomics,
    entities::{
        beneficiary_transaction, claim, community, inflow,
        sea_orm_active_enums::{self, CommunityVisibility},
    },
};
use eyre::{Result, WrapErr};
use sea_orm::ActiveValue::Set;
use tracing::warn;

use crate::{
    registry::CommunityRecord,
    store::{
        BeneficiaryChange, BeneficiaryTransfer, Claim, CommunityParams, CommunityStore, Inflow,
        MetadataStore, PendingCommunity, ProposalStatus,
    },
};

/// Postgres-backed stores for one chain. Addresses are persisted as lowercase hex.
#[derive(Clone)]
pub struct DbStore {
    db: Arc<DbClient>,
    chain_id: i64,
}

impl DbStore {
    pub fn new(db: Arc<DbClient>, chain_id: u64) -> Result<Self> {
        Ok(Self {
            db,
            chain_id: i64::try_from(chain_id).wrap_err("chain id does not fit i64")?,
        })
    }
}

fn addr(address: &Address) -> String {
    format!("{address:#x}")
}

fn hash(hash: &B256) -> String {
    format!("{hash:?}")
}

fn to_i64(value: u64, field: &'static str) -> Result<i64> {
    i64::try_from(value).wrap_err_with(|| format!("{field} {value} does not fit i64"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).wrap_err_with(|| format!("negative block number {value} in sync_state"))
}

fn parse_u256(value: &str, field: &'static str) -> Result<U256> {
    U256::from_str(value).wrap_err_with(|| format!("invalid {field} '{value}'"))
}

fn economics(params: &CommunityParams) -> CommunityEconomics {
    CommunityEconomics {
        claim_amount: params.claim_amount.to_string(),
        max_claim: params.max_claim.to_string(),
        decrease_step: params.decrease_step.map(|d| d.to_string()),
        base_interval: params.base_interval.to_string(),
        increment_interval: params.increment_interval.to_string(),
    }
}

fn record(model: community::Model) -> Option<CommunityRecord> {
    let raw = model.contract_address?;
    match Address::from_str(&raw) {
        Ok(contract_address) => Some(CommunityRecord {
            contract_address,
            internal_id: model.id,
            public_id: model.public_id,
            is_public: model.visibility == CommunityVisibility::Public,
        }),
        Err(e) => {
            warn!(community = model.id, "Skipping community with bad address {}: {}", raw, e);
            None
        }
    }
}

fn pending(model: community::Model) -> Result<PendingCommunity> {
    let decrease_step = match model.decrease_step.as_str() {
        "" => None,
        value => Some(parse_u256(value, "decrease_step")?),
    };

    Ok(PendingCommunity {
        id: model.id,
        is_public: model.visibility == CommunityVisibility::Public,
        params: CommunityParams {
            claim_amount: parse_u256(&model.claim_amount, "claim_amount")?,
            max_claim: parse_u256(&model.max_claim, "max_claim")?,
            decrease_step,
            base_interval: parse_u256(&model.base_interval, "base_interval")?,
            increment_interval: parse_u256(&model.increment_interval, "increment_interval")?,
        },
        public_id: model.public_id,
    })
}

impl From<ProposalStatus> for sea_orm_active_enums::ProposalStatus {
    fn from(status: ProposalStatus) -> Self {
        match status {
            ProposalStatus::Pending => Self::Pending,
            ProposalStatus::Queued => Self::Queued,
            ProposalStatus::Executed => Self::Executed,
            ProposalStatus::Canceled => Self::Canceled,
        }
    }
}

#[async_trait]
impl CommunityStore for DbStore {
    async fn communities(&self) -> Result<Vec<CommunityRecord>> {
        let models = self.db.valid_communities().await?;
        Ok(models.into_iter().filter_map(record).collect())
    }

    async fn public_beneficiaries(&self) -> Result<Vec<Address>> {
        let ids = self.db.public_community_ids().await?;
        let addresses = self.db.active_beneficiaries_in(ids).await?;
        Ok(addresses
            .iter()
            .filter_map(|a| Address::from_str(a).ok())
            .collect())
    }

    async fn find_community_by_address(
        &self,
        address: Address,
    ) -> Result<Option<CommunityRecord>> {
        let model = self.db.find_community_by_contract(&addr(&address)).await?;
        Ok(model.and_then(record))
    }

    async fn find_pending_community(
        &self,
        requester: Address,
    ) -> Result<Option<PendingCommunity>> {
        self.db
            .find_pending_community_by_requester(&addr(&requester))
            .await?
            .map(pending)
            .transpose()
    }

    async fn add_beneficiary(&self, change: &BeneficiaryChange) -> Result<()> {
        self.db
            .upsert_beneficiary(
                &addr(&change.beneficiary),
                change.community_id,
                &addr(&change.manager),
                &hash(&change.tx_hash),
                change.at,
            )
            .await
    }

    async fn remove_beneficiary(&self, change: &BeneficiaryChange) -> Result<()> {
        let rows = self
            .db
            .deactivate_beneficiary(
                &addr(&change.beneficiary),
                change.community_id,
                &hash(&change.tx_hash),
                change.at,
            )
            .await?;
        if rows == 0 {
            warn!(
                beneficiary = %change.beneficiary,
                community = change.community_id,
                "Removed beneficiary was never added"
            );
        }
        Ok(())
    }

    async fn record_beneficiary_transfers(&self, transfers: &[BeneficiaryTransfer]) -> Result<()> {
        let models = transfers
            .iter()
            .map(|t| {
                Ok(beneficiary_transaction::ActiveModel {
                    tx_hash: Set(hash(&t.tx_hash)),
                    log_index: Set(to_i64(t.log_index, "log index")?),
                    beneficiary: Set(addr(&t.beneficiary)),
                    with_address: Set(addr(&t.with_address)),
                    amount: Set(t.amount.to_string()),
                    is_incoming: Set(t.is_incoming),
                    tx_at: Set(t.at.into()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.db.bulk_insert_beneficiary_transactions(models).await
    }

    async fn add_claim(&self, claim: &Claim) -> Result<()> {
        let model = claim::ActiveModel {
            tx_hash: Set(hash(&claim.tx_hash)),
            log_index: Set(to_i64(claim.log_index, "log index")?),
            beneficiary: Set(addr(&claim.beneficiary)),
            community_id: Set(claim.community_id),
            amount: Set(claim.amount.to_string()),
            claimed_at: Set(claim.at.into()),
        };
        self.db.insert_claim(model).await?;
        Ok(())
    }

    async fn add_inflow(&self, inflow: &Inflow) -> Result<()> {
        let model = inflow::ActiveModel {
            tx_hash: Set(hash(&inflow.tx_hash)),
            log_index: Set(to_i64(inflow.log_index, "log index")?),
            from: Set(addr(&inflow.from)),
            contract_address: Set(addr(&inflow.contract_address)),
            amount: Set(inflow.amount.to_string()),
            block_number: Set(to_i64(inflow.block_number, "block number")?),
            received_at: Set(inflow.at.into()),
        };
        self.db.insert_inflow(model).await?;
        Ok(())
    }

    async fn add_manager(&self, manager: Address, community_id: i32) -> Result<()> {
        self.db.upsert_manager(&addr(&manager), community_id, true).await
    }

    async fn remove_manager(&self, manager: Address, community_id: i32) -> Result<()> {
        self.db.upsert_manager(&addr(&manager), community_id, false).await
    }

    async fn set_manager_blocked(
        &self,
        manager: Address,
        community_id: i32,
        blocked: bool,
    ) -> Result<()> {
        self.db
            .set_manager_blocked(&addr(&manager), community_id, blocked)
            .await
    }

    async fn update_community_params(
        &self,
        community_id: i32,
        params: &CommunityParams,
    ) -> Result<()> {
        let rows = self
            .db
            .update_community_economics(community_id, economics(params))
            .await?;
        if rows == 0 {
            warn!(community = community_id, "No community row to update params on");
        }
        Ok(())
    }

    async fn set_community_blocked(&self, community_id: i32, blocked: bool) -> Result<()> {
        self.db.set_community_blocked(community_id, blocked).await?;
        Ok(())
    }

    async fn mark_community_valid(&self, community_id: i32, contract: Address) -> Result<u64> {
        self.db
            .mark_community_valid(community_id, &addr(&contract))
            .await
    }

    async fn remove_community(&self, community_id: i32, at: DateTime<Utc>) -> Result<()> {
        self.db.remove_community(community_id, at).await
    }

    async fn migrate_community(
        &self,
        community_id: i32,
        previous: Address,
        new: Address,
    ) -> Result<u64> {
        self.db
            .migrate_community(community_id, &addr(&previous), &addr(&new))
            .await
    }

    async fn attach_proposal(
        &self,
        community_id: i32,
        proposal_id: u64,
        end_block: u64,
    ) -> Result<bool> {
        self.db
            .attach_proposal(
                community_id,
                to_i64(proposal_id, "proposal id")?,
                to_i64(end_block, "end block")?,
            )
            .await
    }

    async fn update_proposal_status(
        &self,
        proposal_id: u64,
        status: ProposalStatus,
        end_block: Option<u64>,
    ) -> Result<bool> {
        let end_block = end_block.map(|b| to_i64(b, "end block")).transpose()?;
        self.db
            .update_proposal_status(to_i64(proposal_id, "proposal id")?, status.into(), end_block)
            .await
    }
}

#[async_trait]
impl MetadataStore for DbStore {
    async fn last_processed_block(&self) -> Result<Option<u64>> {
        let state = self.db.get_sync_state(self.chain_id).await?;
        state
            .and_then(|s| s.last_processed_block)
            .map(to_u64)
            .transpose()
    }

    async fn set_last_processed_block(&self, block: u64) -> Result<()> {
        self.db
            .upsert_last_processed_block(self.chain_id, to_i64(block, "block number")?)
            .await
    }

    async fn recovery_checkpoint(&self) -> Result<Option<u64>> {
        let state = self.db.get_sync_state(self.chain_id).await?;
        state
            .and_then(|s| s.recovery_start_block)
            .map(to_u64)
            .transpose()
    }

    async fn set_recovery_checkpoint(&self, block: u64) -> Result<()> {
        self.db
            .upsert_recovery_start_block(self.chain_id, Some(to_i64(block, "block number")?))
            .await
    }

    async fn clear_recovery_checkpoint(&self) -> Result<()> {
        self.db
            .upsert_recovery_start_block(self.chain_id, None)
            .await
    }
}

//! Persistence seams used by the ingestion pipeline.
//!
//! [`CommunityStore`] holds the indexed domain data and [`MetadataStore`] the sync
//! progress markers. Both are implemented for the Postgres client in [`crate::db`].

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;

use crate::registry::CommunityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunityParams {
    pub claim_amount: U256,
    pub max_claim: U256,
    /// Unknown for legacy communities, which have no decrease step.
    pub decrease_step: Option<U256>,
    pub base_interval: U256,
    pub increment_interval: U256,
}

impl CommunityParams {
    /// Whether an on-chain request for these parameters is the same request as `self`.
    /// The decrease step only has to agree when both sides know it.
    pub fn same_request(&self, other: &CommunityParams) -> bool {
        let decrease_step_agrees = match (self.decrease_step, other.decrease_step) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };

        self.claim_amount == other.claim_amount
            && self.max_claim == other.max_claim
            && self.base_interval == other.base_interval
            && self.increment_interval == other.increment_interval
            && decrease_step_agrees
    }
}

/// A community request awaiting on-chain creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommunity {
    pub id: i32,
    pub public_id: String,
    pub is_public: bool,
    pub params: CommunityParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeneficiaryChange {
    pub beneficiary: Address,
    pub community_id: i32,
    pub manager: Address,
    pub tx_hash: B256,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub beneficiary: Address,
    pub community_id: i32,
    pub amount: U256,
    pub tx_hash: B256,
    pub log_index: u64,
    pub at: DateTime<Utc>,
}

/// Funds received by a community or the treasury.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inflow {
    pub from: Address,
    pub contract_address: Address,
    pub amount: U256,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub at: DateTime<Utc>,
}

/// One side of a token transfer involving a public beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeneficiaryTransfer {
    pub beneficiary: Address,
    pub with_address: Address,
    pub amount: U256,
    pub is_incoming: bool,
    pub tx_hash: B256,
    pub log_index: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Pending,
    Queued,
    Executed,
    Canceled,
}

/// Every write here must be idempotent: replaying an event after a crash or a
/// provider switch must leave the store as if the event had been applied once.
#[async_trait]
pub trait CommunityStore: Send + Sync {
    async fn communities(&self) -> Result<Vec<CommunityRecord>>;
    async fn public_beneficiaries(&self) -> Result<Vec<Address>>;
    async fn find_community_by_address(&self, address: Address)
        -> Result<Option<CommunityRecord>>;
    async fn find_pending_community(&self, requester: Address)
        -> Result<Option<PendingCommunity>>;

    async fn add_beneficiary(&self, change: &BeneficiaryChange) -> Result<()>;
    async fn remove_beneficiary(&self, change: &BeneficiaryChange) -> Result<()>;
    async fn record_beneficiary_transfers(&self, transfers: &[BeneficiaryTransfer]) -> Result<()>;
    async fn add_claim(&self, claim: &Claim) -> Result<()>;
    async fn add_inflow(&self, inflow: &Inflow) -> Result<()>;

    async fn add_manager(&self, manager: Address, community_id: i32) -> Result<()>;
    async fn remove_manager(&self, manager: Address, community_id: i32) -> Result<()>;
    async fn set_manager_blocked(
        &self,
        manager: Address,
        community_id: i32,
        blocked: bool,
    ) -> Result<()>;

    async fn update_community_params(&self, community_id: i32, params: &CommunityParams)
        -> Result<()>;
    async fn set_community_blocked(&self, community_id: i32, blocked: bool) -> Result<()>;
    /// Returns the number of pending requests promoted; zero is an anomaly for callers.
    async fn mark_community_valid(&self, community_id: i32, contract: Address) -> Result<u64>;
    async fn remove_community(&self, community_id: i32, at: DateTime<Utc>) -> Result<()>;
    async fn migrate_community(
        &self,
        community_id: i32,
        previous: Address,
        new: Address,
    ) -> Result<u64>;

    /// Returns false when the proposal was already tracked.
    async fn attach_proposal(&self, community_id: i32, proposal_id: u64, end_block: u64)
        -> Result<bool>;
    /// Returns false when no tracked proposal has this id.
    async fn update_proposal_status(
        &self,
        proposal_id: u64,
        status: ProposalStatus,
        end_block: Option<u64>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn last_processed_block(&self) -> Result<Option<u64>>;
    async fn set_last_processed_block(&self, block: u64) -> Result<()>;
    async fn recovery_checkpoint(&self) -> Result<Option<u64>>;
    async fn set_recovery_checkpoint(&self, block: u64) -> Result<()>;
    async fn clear_recovery_checkpoint(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(decrease_step: Option<u64>) -> CommunityParams {
        CommunityParams {
            claim_amount: U256::from(1_000u64),
            max_claim: U256::from(50_000u64),
            decrease_step: decrease_step.map(U256::from),
            base_interval: U256::from(17_280u64),
            increment_interval: U256::from(60u64),
        }
    }

    #[test]
    fn decrease_step_only_compared_when_known() {
        assert!(params(Some(10)).same_request(&params(Some(10))));
        assert!(params(None).same_request(&params(Some(10))));
        assert!(!params(Some(5)).same_request(&params(Some(10))));

        let mut other = params(Some(10));
        other.max_claim = U256::from(1u64);
        assert!(!params(Some(10)).same_request(&other));
    }
}

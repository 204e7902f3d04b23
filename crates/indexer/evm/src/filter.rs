use alloy::{
    primitives::{keccak256, B256},
    rpc::types::Filter,
    sol_types::SolEvent,
};

use crate::{
    contracts::{CommunityAdmin, CommunityV1, CommunityV2, Governance, Token},
    types::ChainLog,
};

/// Every event the pipeline listens for, across all contract families and ABI generations.
pub const COMMUNITY_EVENT_SIGNATURES: &[&str] = &[
    Token::Transfer::SIGNATURE,
    CommunityV2::BeneficiaryAdded::SIGNATURE,
    CommunityV2::BeneficiaryRemoved::SIGNATURE,
    CommunityV2::BeneficiaryClaim::SIGNATURE,
    CommunityV2::ManagerAdded::SIGNATURE,
    CommunityV2::ManagerRemoved::SIGNATURE,
    CommunityV2::ManagerAddedToBlockList::SIGNATURE,
    CommunityV2::ManagerRemovedFromBlockList::SIGNATURE,
    CommunityV2::BeneficiaryParamsUpdated::SIGNATURE,
    CommunityV2::CommunityLocked::SIGNATURE,
    CommunityV2::CommunityUnlocked::SIGNATURE,
    CommunityV1::ManagerAdded::SIGNATURE,
    CommunityV1::ManagerRemoved::SIGNATURE,
    CommunityV1::BeneficiaryAdded::SIGNATURE,
    CommunityV1::BeneficiaryRemoved::SIGNATURE,
    CommunityV1::BeneficiaryClaim::SIGNATURE,
    CommunityV1::CommunityEdited::SIGNATURE,
    CommunityV1::CommunityLocked::SIGNATURE,
    CommunityV1::CommunityUnlocked::SIGNATURE,
    CommunityAdmin::CommunityAdded::SIGNATURE,
    CommunityAdmin::CommunityRemoved::SIGNATURE,
    CommunityAdmin::CommunityMigrated::SIGNATURE,
    Governance::ProposalCreated::SIGNATURE,
    Governance::ProposalCanceled::SIGNATURE,
    Governance::ProposalQueued::SIGNATURE,
    Governance::ProposalExecuted::SIGNATURE,
];

/// Topic-0 filter shared by replay and the live subscription. It is not restricted by
/// address: community contracts are created at runtime and legacy contracts must be
/// seen before they are registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    topics: Vec<B256>,
}

impl LogFilter {
    pub fn new(signatures: &[&str]) -> Self {
        let mut topics: Vec<B256> = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let topic = keccak256(signature.as_bytes());
            // v1 and v2 share a few signatures
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        Self { topics }
    }

    pub fn community_ingestion() -> Self {
        Self::new(COMMUNITY_EVENT_SIGNATURES)
    }

    pub fn topics(&self) -> &[B256] {
        &self.topics
    }

    pub fn matches(&self, log: &ChainLog) -> bool {
        log.topic0().is_some_and(|t| self.topics.contains(t))
    }

    pub fn to_filter(&self) -> Filter {
        Filter::new().event_signature(self.topics.clone())
    }

    pub fn to_range_filter(&self, from_block: u64, to_block: u64) -> Filter {
        self.to_filter().from_block(from_block).to_block(to_block)
    }
}

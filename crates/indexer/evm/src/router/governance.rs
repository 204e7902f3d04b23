use alloy::{
    primitives::{Bytes, U256},
    sol_types::SolCall,
};
use tracing::{debug, error, info};

use super::EventRouter;
use crate::{
    contracts::CommunityAdmin::addCommunityCall,
    decoder::GovernanceEvent,
    error::ParserError,
    store::{CommunityParams, ProposalStatus},
    types::ChainLog,
};

impl EventRouter {
    pub(super) async fn handle_governance(
        &self,
        event: &GovernanceEvent,
        log: &ChainLog,
    ) -> eyre::Result<bool> {
        match event {
            GovernanceEvent::ProposalCreated {
                id,
                signatures,
                calldatas,
                end_block,
            } => match (as_u64(id, "proposal id"), as_u64(end_block, "end block")) {
                (Ok(id), Ok(end_block)) => {
                    self.proposal_created(id, end_block, signatures, calldatas)
                        .await?
                }
                (Err(e), _) | (_, Err(e)) => out_of_range(&e, log),
            },
            GovernanceEvent::ProposalCanceled { id } => match as_u64(id, "proposal id") {
                Ok(id) => self.proposal_status(id, ProposalStatus::Canceled, None).await?,
                Err(e) => out_of_range(&e, log),
            },
            GovernanceEvent::ProposalQueued { id, eta } => {
                match (as_u64(id, "proposal id"), as_u64(eta, "eta")) {
                    (Ok(id), Ok(eta)) => {
                        self.proposal_status(id, ProposalStatus::Queued, Some(eta))
                            .await?
                    }
                    (Err(e), _) | (_, Err(e)) => out_of_range(&e, log),
                }
            }
            GovernanceEvent::ProposalExecuted { id } => match as_u64(id, "proposal id") {
                Ok(id) => self.proposal_status(id, ProposalStatus::Executed, None).await?,
                Err(e) => out_of_range(&e, log),
            },
        }
        Ok(true)
    }

    async fn proposal_created(
        &self,
        proposal_id: u64,
        end_block: u64,
        signatures: &[String],
        calldatas: &[Bytes],
    ) -> eyre::Result<()> {
        for request in add_community_requests(signatures, calldatas) {
            let Some(requester) = request.managers.first() else {
                continue;
            };

            let Some(pending) = self.store.find_pending_community(*requester).await? else {
                debug!(proposal_id, %requester, "No pending community for proposal action");
                continue;
            };

            let requested = CommunityParams {
                claim_amount: request.claimAmount,
                max_claim: request.maxClaim,
                decrease_step: Some(request.decreaseStep),
                base_interval: request.baseInterval,
                increment_interval: request.incrementInterval,
            };
            if !pending.params.same_request(&requested) {
                debug!(proposal_id, id = pending.id, "Proposal params differ from pending request");
                continue;
            }

            if self
                .store
                .attach_proposal(pending.id, proposal_id, end_block)
                .await?
            {
                info!(proposal_id, id = pending.id, "Tracking community proposal");
            } else {
                debug!(proposal_id, "Proposal already tracked");
            }
        }
        Ok(())
    }

    async fn proposal_status(
        &self,
        proposal_id: u64,
        status: ProposalStatus,
        end_block: Option<u64>,
    ) -> eyre::Result<()> {
        let updated = self
            .store
            .update_proposal_status(proposal_id, status, end_block)
            .await?;
        if !updated {
            debug!(proposal_id, ?status, "Proposal is not community related");
        }
        Ok(())
    }
}

/// `addCommunity` actions in a proposal. A blank signature means the calldata carries
/// its own selector.
fn add_community_requests(signatures: &[String], calldatas: &[Bytes]) -> Vec<addCommunityCall> {
    signatures
        .iter()
        .zip(calldatas)
        .filter_map(|(signature, calldata)| {
            let signature: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
            if signature.is_empty() {
                addCommunityCall::abi_decode(calldata).ok()
            } else if signature == addCommunityCall::SIGNATURE {
                addCommunityCall::abi_decode_raw(calldata).ok()
            } else {
                None
            }
        })
        .collect()
}

fn as_u64(value: &U256, field: &'static str) -> Result<u64, ParserError> {
    u64::try_from(*value).map_err(|_| ParserError::NumberOverflow { field })
}

fn out_of_range(error: &ParserError, log: &ChainLog) {
    error!(tx = %log.transaction_hash, "Skipping governance event: {}", error);
}

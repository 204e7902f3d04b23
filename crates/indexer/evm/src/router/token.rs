use alloy::primitives::{Address, U256};
use tracing::debug;

use super::EventRouter;
use crate::{
    decoder::TokenEvent,
    store::{BeneficiaryTransfer, Inflow},
    types::ChainLog,
};

impl EventRouter {
    pub(super) async fn handle_token(&self, event: &TokenEvent, log: &ChainLog) -> eyre::Result<bool> {
        let TokenEvent::Transfer { from, to, value } = event;

        if self.registry.contains(to) || *to == self.addresses.treasury {
            let inflow = Inflow {
                from: *from,
                contract_address: *to,
                amount: *value,
                block_number: log.block_number,
                tx_hash: log.transaction_hash,
                log_index: log.log_index,
                at: self.block_time(log).await?,
            };
            self.store.add_inflow(&inflow).await?;
            return Ok(true);
        }

        // payouts from a community are recorded through BeneficiaryClaim
        if self.registry.contains(from) {
            return Ok(true);
        }

        if !self.is_beneficiary_activity(from, to, value) {
            debug!(tx = %log.transaction_hash, "Transfer is not beneficiary activity");
            return Ok(true);
        }

        let at = self.block_time(log).await?;
        let sides = [(*from, *to, false), (*to, *from, true)];
        let transfers: Vec<BeneficiaryTransfer> = sides
            .into_iter()
            .filter(|(beneficiary, _, _)| self.registry.is_public_beneficiary(beneficiary))
            .map(|(beneficiary, with_address, is_incoming)| BeneficiaryTransfer {
                beneficiary,
                with_address,
                amount: *value,
                is_incoming,
                tx_hash: log.transaction_hash,
                log_index: log.log_index,
                at,
            })
            .collect();

        self.store.record_beneficiary_transfers(&transfers).await?;
        Ok(true)
    }

    /// Neither side is a community here.
    fn is_beneficiary_activity(&self, from: &Address, to: &Address, value: &U256) -> bool {
        if from == to || *to == self.addresses.attestation {
            return false;
        }
        if *value < self.settings.dust_threshold {
            return false;
        }
        self.registry.is_public_beneficiary(from) || self.registry.is_public_beneficiary(to)
    }
}
